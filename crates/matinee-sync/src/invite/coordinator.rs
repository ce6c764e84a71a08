//! Invite coordination over the shared store.
//!
//! The invite record is collectively owned: any peer may delete it once its
//! condition is met (consensus, expiry, depopulation). Deleting an
//! already-deleted record is a no-op, which is what makes redundant sweeps
//! across peers harmless.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use matinee_common::{epoch_ms, Identity, PeerBus, PeerEvent, RoomError, StoreError};
use matinee_store::{Concern, EventKind, SharedStore, SubscriptionManager};

use crate::chat::ChatLog;
use crate::protocol::{member_ids, paths, InviteRecord};

use super::types::{AcceptancePolicy, InviteConfig};

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RoomTasks {
    sweep: Option<JoinHandle<()>>,
    population: Option<JoinHandle<()>>,
}

type TaskMap = Arc<Mutex<HashMap<String, RoomTasks>>>;

pub struct InviteCoordinator {
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    subs: Arc<SubscriptionManager>,
    chat: Arc<ChatLog>,
    config: InviteConfig,
    tasks: TaskMap,
}

impl InviteCoordinator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
        subs: Arc<SubscriptionManager>,
        chat: Arc<ChatLog>,
        config: InviteConfig,
    ) -> Self {
        Self {
            store,
            bus,
            subs,
            chat,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create (or overwrite) the room's active invite and start the local
    /// expiry sweep.
    pub async fn send_invite(
        &self,
        room_id: &str,
        inviter: &Identity,
        movie_url: &str,
    ) -> Result<(), RoomError> {
        if !inviter.is_signed_in() {
            return Err(RoomError::NotAuthenticated);
        }

        let now = epoch_ms();
        let record = InviteRecord {
            created_by: inviter.user_id.clone(),
            movie_url: movie_url.to_string(),
            created_at: now,
            expires_at: now + self.config.ttl_ms,
            accepted_invitees: HashMap::new(),
        };
        let value = json!(record);
        self.store
            .set(&paths::active_invite(room_id), value.clone())
            .await?;

        // The announcement is decoration; an invite without one still works.
        if let Err(e) = self
            .chat
            .announce(
                room_id,
                &format!(
                    "{} invited everyone to watch {movie_url}",
                    inviter.display_name
                ),
            )
            .await
        {
            warn!(room_id, "invite announcement failed: {e}");
        }

        self.bus.publish(PeerEvent::ActiveInviteUpdated {
            room_id: room_id.to_string(),
            invite: Some(value),
        });

        start_sweep(
            &self.tasks,
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            room_id,
            self.config.sweep_interval,
        );
        info!(room_id, inviter = %inviter.user_id, "invite sent");
        Ok(())
    }

    /// Record an acceptance and immediately re-check consensus.
    pub async fn accept_invite(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.store
            .set(&paths::accepted_invitee(room_id, user_id), json!(true))
            .await?;
        evaluate_consensus(&self.store, &self.bus, room_id).await
    }

    /// Withdraw the active invite. By convention only the creator calls
    /// this, but nothing below the application enforces it.
    pub async fn cancel_invite(&self, room_id: &str) -> Result<(), RoomError> {
        self.store.remove(&paths::active_invite(room_id)).await?;
        self.bus.publish(PeerEvent::ActiveInviteUpdated {
            room_id: room_id.to_string(),
            invite: None,
        });
        info!(room_id, "invite cancelled");
        Ok(())
    }

    /// Watch the invite record and the roster, re-running the consensus
    /// check on every mutation of either. Observing an invite also starts
    /// this client's expiry sweep, so non-creator peers sweep too.
    pub async fn watch(&self, room_id: &str) {
        let mut invite_watch = self
            .store
            .subscribe(&paths::active_invite(room_id), EventKind::ValueChanged)
            .await;
        let mut users_watch = self
            .store
            .subscribe(&paths::users(room_id), EventKind::ValueChanged)
            .await;

        let store = Arc::clone(&self.store);
        let bus = Arc::clone(&self.bus);
        let tasks = Arc::clone(&self.tasks);
        let config = self.config.clone();
        let room = room_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = invite_watch.rx.recv() => {
                        let Some(change) = change else { break };
                        if !change.value.is_null() {
                            start_sweep(
                                &tasks,
                                Arc::clone(&store),
                                Arc::clone(&bus),
                                &room,
                                config.sweep_interval,
                            );
                        }
                        if let Err(e) = evaluate_consensus(&store, &bus, &room).await {
                            warn!(room_id = %room, "consensus check failed: {e}");
                        }
                    }
                    change = users_watch.rx.recv() => {
                        let Some(change) = change else { break };
                        if config.acceptance_policy == AcceptancePolicy::ClearOnLeave {
                            clear_departed_acceptances(&store, &room, &change.value).await;
                        }
                        if let Err(e) = evaluate_consensus(&store, &bus, &room).await {
                            warn!(room_id = %room, "consensus check failed: {e}");
                        }
                        schedule_population_check(
                            &tasks,
                            Arc::clone(&store),
                            Arc::clone(&bus),
                            &room,
                            config.population_check_delay,
                        );
                    }
                }
            }
        });
        self.subs.start(room_id, Concern::Invite, task);
    }

    /// Tear down the watcher and every timer owned for this room.
    pub fn stop(&self, room_id: &str) {
        self.subs.stop(room_id, Concern::Invite);
        let mut tasks = self.tasks.lock().expect("invite task registry poisoned");
        if let Some(room_tasks) = tasks.remove(room_id) {
            if let Some(sweep) = room_tasks.sweep {
                sweep.abort();
            }
            if let Some(population) = room_tasks.population {
                population.abort();
            }
        }
    }
}

impl Drop for InviteCoordinator {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().expect("invite task registry poisoned");
        for (_, room_tasks) in tasks.drain() {
            if let Some(sweep) = room_tasks.sweep {
                sweep.abort();
            }
            if let Some(population) = room_tasks.population {
                population.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Re-check acceptance completeness from a just-read snapshot and, when
/// complete, delete the invite and hand the session off to every peer.
async fn evaluate_consensus(
    store: &Arc<dyn SharedStore>,
    bus: &Arc<PeerBus>,
    room_id: &str,
) -> Result<(), RoomError> {
    let value = store.once(&paths::active_invite(room_id)).await?;
    if value.is_null() {
        return Ok(());
    }
    let invite: InviteRecord = serde_json::from_value(value).map_err(|e| {
        StoreError::malformed(paths::active_invite(room_id).as_str(), e.to_string())
    })?;

    let users = store.once(&paths::users(room_id)).await?;
    let members = member_ids(&users);
    let target: Vec<&String> = members
        .iter()
        .filter(|m| **m != invite.created_by)
        .collect();
    if target.is_empty() {
        return Ok(());
    }

    let accepted: HashSet<&str> = invite.accepted().collect();
    if !target.iter().all(|m| accepted.contains(m.as_str())) {
        return Ok(());
    }

    // Consensus: delete first, then hand off. A racing peer that read the
    // same snapshot deletes a second time harmlessly.
    store.remove(&paths::active_invite(room_id)).await?;
    bus.publish(PeerEvent::ActiveInviteUpdated {
        room_id: room_id.to_string(),
        invite: None,
    });
    bus.publish(PeerEvent::StartSession {
        room_id: room_id.to_string(),
        movie_url: invite.movie_url.clone(),
    });
    info!(room_id, movie_url = %invite.movie_url, "invite accepted by all, starting session");
    Ok(())
}

/// Under `ClearOnLeave`, scrub acceptance flags of users no longer in the
/// roster. Best-effort; a missed scrub is re-attempted on the next change.
async fn clear_departed_acceptances(
    store: &Arc<dyn SharedStore>,
    room_id: &str,
    users: &serde_json::Value,
) {
    let members: HashSet<String> = member_ids(users).into_iter().collect();
    let invite_value = match store.once(&paths::active_invite(room_id)).await {
        Ok(v) if !v.is_null() => v,
        _ => return,
    };
    let Ok(invite) = serde_json::from_value::<InviteRecord>(invite_value) else {
        return;
    };

    for uid in invite.accepted_invitees.keys() {
        if !members.contains(uid) {
            debug!(room_id, user_id = %uid, "clearing departed user's acceptance");
            if let Err(e) = store.remove(&paths::accepted_invitee(room_id, uid)).await {
                warn!(room_id, "acceptance scrub failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Start the per-room expiry sweep unless one is already running on this
/// client. The sweep re-reads the invite every interval and deletes it once
/// past `expiresAt`; it ends itself when the invite is gone.
fn start_sweep(
    tasks: &TaskMap,
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    room_id: &str,
    interval: Duration,
) {
    let mut map = tasks.lock().expect("invite task registry poisoned");
    let entry = map.entry(room_id.to_string()).or_default();
    if entry
        .sweep
        .as_ref()
        .map(|h| !h.is_finished())
        .unwrap_or(false)
    {
        return;
    }

    let room = room_id.to_string();
    entry.sweep = Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let value = match store.once(&paths::active_invite(&room)).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(room_id = %room, "expiry sweep read failed: {e}");
                    continue;
                }
            };
            if value.is_null() {
                break;
            }
            let invite: InviteRecord = match serde_json::from_value(value) {
                Ok(i) => i,
                Err(e) => {
                    warn!(room_id = %room, "malformed invite during sweep: {e}");
                    continue;
                }
            };
            if !invite.is_expired(epoch_ms()) {
                continue;
            }
            if let Err(e) = store.remove(&paths::active_invite(&room)).await {
                // Leave the invite for the next tick; the sweep self-heals.
                warn!(room_id = %room, "expired invite removal failed: {e}");
                continue;
            }
            bus.publish(PeerEvent::ActiveInviteUpdated {
                room_id: room.clone(),
                invite: None,
            });
            info!(room_id = %room, "expired invite removed");
            break;
        }
    }));
}

/// Schedule (or reschedule) the post-departure population check: 1.5s after
/// a roster change, an invite in an under-populated room is deleted.
fn schedule_population_check(
    tasks: &TaskMap,
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    room_id: &str,
    delay: Duration,
) {
    let room = room_id.to_string();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        match store.once(&paths::active_invite(&room)).await {
            Ok(v) if !v.is_null() => {}
            _ => return,
        }

        let users = match store.once(&paths::users(&room)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(room_id = %room, "population check read failed: {e}");
                return;
            }
        };
        if member_ids(&users).len() >= 2 {
            return;
        }

        debug!(room_id = %room, "room under-populated, dropping invite");
        if let Err(e) = store.remove(&paths::active_invite(&room)).await {
            warn!(room_id = %room, "under-population invite removal failed: {e}");
            return;
        }
        bus.publish(PeerEvent::ActiveInviteUpdated {
            room_id: room,
            invite: None,
        });
    });

    let mut map = tasks.lock().expect("invite task registry poisoned");
    let entry = map.entry(room_id.to_string()).or_default();
    if let Some(prev) = entry.population.replace(handle) {
        prev.abort();
    }
}
