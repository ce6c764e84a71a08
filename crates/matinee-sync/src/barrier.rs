//! The "arrived at the movie" barrier.
//!
//! Each peer votes itself ready after navigating to the movie; whichever
//! peer observes the last vote flips the room into session. The
//! read-then-conditional-write has no mutual exclusion; a concurrent
//! flip from two peers is benign because both writes are idempotent.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use matinee_common::{PeerBus, PeerEvent, RoomError};
use matinee_store::SharedStore;

use crate::protocol::{member_ids, paths};

pub struct ReadyBarrier {
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
}

impl ReadyBarrier {
    pub fn new(store: Arc<dyn SharedStore>, bus: Arc<PeerBus>) -> Self {
        Self { store, bus }
    }

    /// Record the user's ready vote; flip the room into session when every
    /// current member has voted. Returns whether this call did the flip.
    pub async fn mark_ready(&self, room_id: &str, user_id: &str) -> Result<bool, RoomError> {
        self.store
            .set(&paths::ready_user(room_id, user_id), json!(true))
            .await?;

        let users = self.store.once(&paths::users(room_id)).await?;
        let ready = self.store.once(&paths::ready_users(room_id)).await?;

        let members = member_ids(&users);
        let all_ready = !members.is_empty()
            && members
                .iter()
                .all(|m| ready.get(m).and_then(|v| v.as_bool()).unwrap_or(false));
        if !all_ready {
            return Ok(false);
        }

        self.store
            .set(&paths::in_session(room_id), json!(true))
            .await?;
        self.store.remove(&paths::ready_users(room_id)).await?;

        info!(room_id, "all members ready, session started");
        self.bus.publish(PeerEvent::InSessionUpdated {
            room_id: room_id.to_string(),
            in_session: true,
        });
        Ok(true)
    }
}
