//! Propagates local play/pause/seek to peers and applies remote updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use matinee_common::{PeerBus, PeerEvent, RoomError};
use matinee_store::{Concern, EventKind, SharedStore, SubscriptionManager};

use crate::protocol::{paths, PlayerAction, PlayerStateEntry};

use super::types::{MediaController, PlaybackConfig};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PlaybackSyncEngine {
    store: Arc<dyn SharedStore>,
    subs: Arc<SubscriptionManager>,
    /// State the listener task shares with the handle.
    shared: Arc<Shared>,
}

struct Shared {
    bus: Arc<PeerBus>,
    controller: Arc<dyn MediaController>,
    user_id: String,
    config: PlaybackConfig,
    /// Set while a remote update is being applied, so the resulting local
    /// media events do not re-propagate.
    suppress: AtomicBool,
    /// Locked by the buffer quorum gate; local play intents become no-ops.
    locked: AtomicBool,
    last_sent: Mutex<Option<(PlayerAction, Instant)>>,
}

impl PlaybackSyncEngine {
    pub fn new(
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
        subs: Arc<SubscriptionManager>,
        controller: Arc<dyn MediaController>,
        user_id: impl Into<String>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            store,
            subs,
            shared: Arc::new(Shared {
                bus,
                controller,
                user_id: user_id.into(),
                config,
                suppress: AtomicBool::new(false),
                locked: AtomicBool::new(false),
                last_sent: Mutex::new(None),
            }),
        }
    }

    /// Handle a media event raised by the local player. Returns whether the
    /// event was propagated to peers.
    pub async fn handle_local_event(
        &self,
        room_id: &str,
        action: PlayerAction,
        time: f64,
    ) -> Result<bool, RoomError> {
        let shared = &self.shared;
        if shared.suppress.load(Ordering::SeqCst) {
            debug!(room_id, ?action, "suppressed echo of a remote update");
            return Ok(false);
        }
        if shared.locked.load(Ordering::SeqCst) && action == PlayerAction::Play {
            debug!(room_id, "play intercepted while locked");
            return Ok(false);
        }

        // Reserve the debounce slot before suspending on the write so a
        // second identical event arriving mid-write is still debounced.
        {
            let mut last = shared.last_sent.lock().expect("debounce state poisoned");
            let debounce = Duration::from_millis(shared.config.debounce_ms);
            if let Some((prev, at)) = *last {
                if prev == action && at.elapsed() < debounce {
                    debug!(room_id, ?action, "debounced duplicate action");
                    return Ok(false);
                }
            }
            *last = Some((action, Instant::now()));
        }

        let entry = PlayerStateEntry {
            action,
            time,
            by: shared.user_id.clone(),
        };
        if let Err(e) = self
            .store
            .push(&paths::player_state(room_id), json!(entry))
            .await
        {
            // Free the slot so a retry is not swallowed by the debounce.
            *shared.last_sent.lock().expect("debounce state poisoned") = None;
            return Err(e.into());
        }
        Ok(true)
    }

    /// Start applying remote `playerState` entries to the local player.
    pub async fn attach(&self, room_id: &str) {
        let mut watch = self
            .store
            .subscribe(&paths::player_state(room_id), EventKind::ChildAdded)
            .await;
        let shared = Arc::clone(&self.shared);
        let room = room_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(change) = watch.rx.recv().await {
                let entry: PlayerStateEntry = match serde_json::from_value(change.value) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(room_id = %room, "ignoring malformed player state: {e}");
                        continue;
                    }
                };
                if entry.by == shared.user_id {
                    continue;
                }
                shared.apply_remote(&room, &entry).await;
            }
        });
        self.subs.start(room_id, Concern::PlayerState, task);
    }

    /// Force a pause without propagating it, then lock local control.
    pub async fn block(&self) {
        self.shared.block().await;
    }

    /// Lift the lock installed by `block`.
    pub async fn resume(&self) {
        self.shared.resume().await;
    }

    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::SeqCst)
    }

    /// End-of-session teardown: stop relaying, lift guards, reset state.
    pub async fn shutdown(&self, room_id: &str) {
        self.subs.stop(room_id, Concern::PlayerState);
        let shared = &self.shared;
        shared.locked.store(false, Ordering::SeqCst);
        shared.suppress.store(false, Ordering::SeqCst);
        shared.controller.set_guards(false).await;
        *shared.last_sent.lock().expect("debounce state poisoned") = None;
    }
}

impl Shared {
    /// Apply one remote update with echo suppression around the mutation.
    async fn apply_remote(&self, room_id: &str, entry: &PlayerStateEntry) {
        self.suppress.store(true, Ordering::SeqCst);

        let local = self.controller.current_time().await;
        if (local - entry.time).abs() > self.config.seek_threshold_secs {
            self.controller.seek(entry.time).await;
        }
        match entry.action {
            PlayerAction::Play => self.controller.play().await,
            PlayerAction::Pause => self.controller.pause().await,
            PlayerAction::Seek => {}
        }

        self.suppress.store(false, Ordering::SeqCst);
        self.bus.publish(PeerEvent::PlayerStateUpdated {
            room_id: room_id.to_string(),
            state: json!(entry),
        });
    }

    async fn block(&self) {
        self.suppress.store(true, Ordering::SeqCst);
        self.controller.pause().await;
        self.suppress.store(false, Ordering::SeqCst);

        self.locked.store(true, Ordering::SeqCst);
        self.controller.set_guards(true).await;
    }

    async fn resume(&self) {
        self.locked.store(false, Ordering::SeqCst);
        self.controller.set_guards(false).await;
    }
}
