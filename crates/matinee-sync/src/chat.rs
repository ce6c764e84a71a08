//! Room chat: append-only entries in the store, relayed to peers.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use matinee_common::{epoch_ms, Identity, PeerBus, PeerEvent, RoomError};
use matinee_store::{Concern, EventKind, SharedStore, SubscriptionManager};

use crate::protocol::{paths, ChatEntry};

pub struct ChatLog {
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    subs: Arc<SubscriptionManager>,
}

impl ChatLog {
    pub fn new(
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
        subs: Arc<SubscriptionManager>,
    ) -> Self {
        Self { store, bus, subs }
    }

    /// Append a user-typed message.
    pub async fn send(
        &self,
        room_id: &str,
        sender: &Identity,
        body: &str,
    ) -> Result<(), RoomError> {
        let entry = ChatEntry {
            id: Uuid::new_v4().to_string(),
            user_id: sender.user_id.clone(),
            display_name: sender.display_name.clone(),
            body: body.to_string(),
            sent_at: epoch_ms(),
            system: false,
        };
        self.append(room_id, entry).await
    }

    /// Append a system announcement (invites and the like).
    pub async fn announce(&self, room_id: &str, body: &str) -> Result<(), RoomError> {
        let entry = ChatEntry {
            id: Uuid::new_v4().to_string(),
            user_id: String::new(),
            display_name: String::new(),
            body: body.to_string(),
            sent_at: epoch_ms(),
            system: true,
        };
        self.append(room_id, entry).await
    }

    async fn append(&self, room_id: &str, entry: ChatEntry) -> Result<(), RoomError> {
        self.store
            .push(&paths::chat(room_id), json!(entry))
            .await
            .map_err(RoomError::from)?;
        Ok(())
    }

    /// Relay every appended entry (local or remote) to peers. The store is
    /// the source of truth: `send`/`announce` do not publish directly, the
    /// watcher does, exactly once per entry.
    pub async fn watch(&self, room_id: &str) {
        let mut watch = self
            .store
            .subscribe(&paths::chat(room_id), EventKind::ChildAdded)
            .await;
        let bus = Arc::clone(&self.bus);
        let room = room_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(change) = watch.rx.recv().await {
                match serde_json::from_value::<ChatEntry>(change.value.clone()) {
                    Ok(_) => {
                        bus.publish(PeerEvent::NewChatMessage {
                            room_id: room.clone(),
                            message: change.value,
                        });
                    }
                    Err(e) => warn!(room_id = %room, "ignoring malformed chat entry: {e}"),
                }
            }
        });
        self.subs.start(room_id, Concern::Chat, task);
    }

    pub fn stop_watching(&self, room_id: &str) {
        self.subs.stop(room_id, Concern::Chat);
    }
}
