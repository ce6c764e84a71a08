//! Room creation, join/leave, and rejoin recovery.

use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use matinee_common::{epoch_ms, Identity, PeerBus, PeerEvent, RoomError};
use matinee_store::{
    best_effort, BestEffortOp, Concern, EventKind, SharedStore, SubscriptionManager,
};

use crate::protocol::{member_ids, paths, ResetIframeFlag, RoomUser};

use super::types::{RejoinOutcome, RoomConfig};

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

pub struct RoomDirectory {
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    subs: Arc<SubscriptionManager>,
    config: RoomConfig,
}

impl RoomDirectory {
    pub fn new(
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
        subs: Arc<SubscriptionManager>,
        config: RoomConfig,
    ) -> Self {
        Self {
            store,
            bus,
            subs,
            config,
        }
    }

    /// Create a room with a fresh 6-digit code and the caller as host.
    ///
    /// The uniqueness check is read-then-write and therefore best-effort:
    /// two peers creating simultaneously can race. Collisions are retried
    /// up to the configured attempt count.
    pub async fn create_room(&self, user: &Identity) -> Result<String, RoomError> {
        ensure_signed_in(user)?;

        for _ in 0..self.config.code_attempts {
            let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
            let existing = self.store.once(&paths::room(&code)).await?;
            if !existing.is_null() {
                continue;
            }

            let mut users = serde_json::Map::new();
            users.insert(user.user_id.clone(), member_record(user, &code)?);
            let room = json!({
                "host": user.user_id,
                "inSession": false,
                "users": users,
            });
            self.store.set(&paths::room(&code), room).await?;
            info!(room_id = %code, host = %user.user_id, "room created");
            return Ok(code);
        }

        Err(RoomError::CreationExhausted(self.config.code_attempts))
    }

    /// Join an existing room. Idempotent for current members.
    pub async fn join_room(&self, user: &Identity, room_id: &str) -> Result<(), RoomError> {
        ensure_signed_in(user)?;

        let room = self.store.once(&paths::room(room_id)).await?;
        if room.is_null() {
            return Err(RoomError::NotFound(room_id.to_string()));
        }

        let members = member_ids(&room["users"]);
        if members.iter().any(|m| m == &user.user_id) {
            return Ok(());
        }
        if members.len() >= self.config.max_members {
            return Err(RoomError::Full(room_id.to_string()));
        }

        let record = member_record(user, room_id)?;
        self.store
            .set(&paths::user(room_id, &user.user_id), record)
            .await?;

        info!(room_id, user_id = %user.user_id, "user joined room");
        self.bus.publish(PeerEvent::UpdateUserList {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Remove a user from a room.
    ///
    /// Every sub-write is independent and best-effort: a failed invite
    /// deletion must not block the roster removal, and vice versa. Failures
    /// are logged; the next sweep cycle self-heals.
    pub async fn leave_room(&self, user_id: &str, room_id: &str) {
        let room = match self.store.once(&paths::room(room_id)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(room_id, "could not read room on leave: {e}");
                Value::Null
            }
        };
        let remaining: Vec<String> = member_ids(&room["users"])
            .into_iter()
            .filter(|m| m != user_id)
            .collect();

        // Host election: a departing host hands the room to whoever is left.
        if room["host"].as_str() == Some(user_id) {
            if let Some(new_host) = remaining.first() {
                best_effort(
                    Arc::clone(&self.store),
                    paths::room(room_id).child("host"),
                    BestEffortOp::Set(json!(new_host)),
                );
            }
        }

        best_effort(
            Arc::clone(&self.store),
            paths::user(room_id, user_id),
            BestEffortOp::Remove,
        );
        best_effort(
            Arc::clone(&self.store),
            paths::last_leave(room_id, user_id),
            BestEffortOp::Set(json!(epoch_ms())),
        );
        best_effort(
            Arc::clone(&self.store),
            paths::typing_user(room_id, user_id),
            BestEffortOp::Remove,
        );
        best_effort(
            Arc::clone(&self.store),
            paths::active_invite(room_id),
            BestEffortOp::Remove,
        );
        best_effort(
            Arc::clone(&self.store),
            paths::in_session(room_id),
            BestEffortOp::Set(json!(false)),
        );
        if remaining.is_empty() {
            best_effort(
                Arc::clone(&self.store),
                paths::last_user_left_at(room_id),
                BestEffortOp::Set(json!(epoch_ms())),
            );
        }

        info!(room_id, user_id, "user left room");
        self.bus.publish(PeerEvent::UpdateUserList {
            room_id: room_id.to_string(),
        });
        self.bus.publish(PeerEvent::ActiveInviteUpdated {
            room_id: room_id.to_string(),
            invite: None,
        });
        self.bus.publish(PeerEvent::InSessionUpdated {
            room_id: room_id.to_string(),
            in_session: false,
        });
    }

    /// Recover membership after an intentional full-page reload that went
    /// through the connection-loss cleanup path.
    pub async fn rejoin_if_recently_kicked(
        &self,
        user: &Identity,
        room_id: &str,
    ) -> Result<RejoinOutcome, RoomError> {
        let room = self.store.once(&paths::room(room_id)).await?;
        if room.is_null() {
            return Err(RoomError::NotFound(room_id.to_string()));
        }

        if member_ids(&room["users"]).iter().any(|m| m == &user.user_id) {
            return Ok(RejoinOutcome::Rejoined);
        }

        let last_leave = self
            .store
            .once(&paths::last_leave(room_id, &user.user_id))
            .await?
            .as_u64();
        let recent = match last_leave {
            Some(at) => epoch_ms().saturating_sub(at) < self.config.rejoin_window_ms,
            None => false,
        };
        if !recent {
            return Ok(RejoinOutcome::Stale);
        }

        let record = member_record(user, room_id)?;
        self.store
            .set(&paths::user(room_id, &user.user_id), record)
            .await?;
        info!(room_id, user_id = %user.user_id, "user rejoined after recent departure");
        self.bus.publish(PeerEvent::UpdateUserList {
            room_id: room_id.to_string(),
        });
        Ok(RejoinOutcome::Rejoined)
    }

    /// Mark or clear the user's typing indicator.
    pub fn set_typing(&self, room_id: &str, user_id: &str, typing: bool) {
        let op = if typing {
            BestEffortOp::Set(json!(true))
        } else {
            BestEffortOp::Remove
        };
        best_effort(
            Arc::clone(&self.store),
            paths::typing_user(room_id, user_id),
            op,
        );
    }

    /// Ask every peer to reload its call iframe.
    pub async fn request_call_reset(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        let flag = ResetIframeFlag {
            by: user_id.to_string(),
            at: epoch_ms(),
        };
        self.store
            .set(&paths::reset_iframe(room_id), json!(flag))
            .await?;
        self.bus.publish(PeerEvent::ResetCallIframe {
            room_id: room_id.to_string(),
            requested_by: user_id.to_string(),
        });
        Ok(())
    }

    /// Watch the roster and push `UpdateUserList` to peers on every change.
    pub async fn watch_members(&self, room_id: &str) {
        let mut watch = self
            .store
            .subscribe(&paths::users(room_id), EventKind::ValueChanged)
            .await;
        let bus = Arc::clone(&self.bus);
        let room = room_id.to_string();

        let task = tokio::spawn(async move {
            while watch.rx.recv().await.is_some() {
                bus.publish(PeerEvent::UpdateUserList {
                    room_id: room.clone(),
                });
            }
        });
        self.subs.start(room_id, Concern::Members, task);
    }

    pub fn stop_watching(&self, room_id: &str) {
        self.subs.stop(room_id, Concern::Members);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_signed_in(identity: &Identity) -> Result<(), RoomError> {
    if identity.is_signed_in() {
        Ok(())
    } else {
        Err(RoomError::NotAuthenticated)
    }
}

fn member_record(user: &Identity, room_id: &str) -> Result<Value, RoomError> {
    serde_json::to_value(RoomUser::from_identity(user)).map_err(|e| {
        RoomError::from(matinee_common::StoreError::malformed(
            paths::user(room_id, &user.user_id).as_str(),
            e.to_string(),
        ))
    })
}
