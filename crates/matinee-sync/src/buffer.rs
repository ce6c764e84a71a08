//! Buffering quorum gate.
//!
//! Every peer reports its buffering status into the store; playback is
//! allowed only while all current members report ready. Reports are
//! coalesced through a settle window so a flickering player does not cause
//! a broadcast storm, and the resume decision waits out a short
//! confirmation delay so a quorum that immediately breaks again never
//! unlocks playback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use matinee_common::{PeerBus, PeerEvent};
use matinee_store::{Concern, EventKind, SharedStore, SubscriptionManager};

use crate::playback::PlaybackSyncEngine;
use crate::protocol::{member_ids, paths, BufferState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Rapid status toggles inside this window only send the last value.
    pub settle_ms: u64,
    /// How long quorum must hold before a resume is issued.
    pub confirm_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            confirm_ms: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GateState {
    settle: Option<JoinHandle<()>>,
    confirm: Option<JoinHandle<()>>,
    quorum_held: bool,
}

enum Decision {
    None,
    Arm,
    Block,
}

pub struct BufferQuorumGate {
    subs: Arc<SubscriptionManager>,
    /// State the watcher task shares with the handle.
    shared: Arc<GateShared>,
}

struct GateShared {
    store: Arc<dyn SharedStore>,
    bus: Arc<PeerBus>,
    engine: Arc<PlaybackSyncEngine>,
    config: BufferConfig,
    rooms: Mutex<HashMap<String, GateState>>,
}

impl BufferQuorumGate {
    pub fn new(
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
        subs: Arc<SubscriptionManager>,
        engine: Arc<PlaybackSyncEngine>,
        config: BufferConfig,
    ) -> Self {
        Self {
            subs,
            shared: Arc::new(GateShared {
                store,
                bus,
                engine,
                config,
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Report this peer's buffering status, coalesced through the settle
    /// window: only the last value reported inside the window is written.
    pub fn report_status(&self, room_id: &str, user_id: &str, status: BufferState) {
        let store = Arc::clone(&self.shared.store);
        let path = paths::buffer_status_user(room_id, user_id);
        let delay = Duration::from_millis(self.shared.config.settle_ms);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.set(&path, json!(status)).await {
                warn!(path = %path, "buffer status write failed: {e}");
            }
        });

        let mut rooms = self.shared.rooms.lock().expect("gate state poisoned");
        let state = rooms.entry(room_id.to_string()).or_default();
        if let Some(prev) = state.settle.replace(handle) {
            prev.abort();
        }
    }

    /// Watch the aggregate buffer statuses and drive the playback engine.
    pub async fn watch(&self, room_id: &str) {
        let mut watch = self
            .shared
            .store
            .subscribe(&paths::buffer_status(room_id), EventKind::ValueChanged)
            .await;
        let shared = Arc::clone(&self.shared);
        let room = room_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(change) = watch.rx.recv().await {
                shared.handle_aggregate(&room, &change.value).await;
            }
        });
        self.subs.start(room_id, Concern::BufferStatus, task);
    }

    /// Tear down the watcher and any pending timers for a room.
    pub fn teardown(&self, room_id: &str) {
        self.subs.stop(room_id, Concern::BufferStatus);
        let mut rooms = self.shared.rooms.lock().expect("gate state poisoned");
        if let Some(state) = rooms.remove(room_id) {
            if let Some(settle) = state.settle {
                settle.abort();
            }
            if let Some(confirm) = state.confirm {
                confirm.abort();
            }
        }
    }
}

impl GateShared {
    async fn handle_aggregate(&self, room_id: &str, statuses: &Value) {
        let users = match self.store.once(&paths::users(room_id)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(room_id, "roster read failed during quorum check: {e}");
                return;
            }
        };

        // Statuses of departed users linger in the store; only current
        // members count.
        let present: Vec<BufferState> = member_ids(&users)
            .iter()
            .filter_map(|m| statuses.get(m))
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        if present.is_empty() {
            return;
        }
        let quorum = present.iter().all(|s| *s == BufferState::Ready);

        let decision = {
            let mut rooms = self.rooms.lock().expect("gate state poisoned");
            let state = rooms.entry(room_id.to_string()).or_default();
            if quorum {
                if state.quorum_held {
                    Decision::None
                } else {
                    state.quorum_held = true;
                    Decision::Arm
                }
            } else {
                state.quorum_held = false;
                if let Some(confirm) = state.confirm.take() {
                    confirm.abort();
                }
                Decision::Block
            }
        };

        match decision {
            Decision::Arm => self.arm_resume(room_id),
            Decision::Block => {
                debug!(room_id, "buffer quorum broken, blocking playback");
                self.engine.block().await;
                self.bus.publish(PeerEvent::BlockPlay {
                    room_id: room_id.to_string(),
                });
            }
            Decision::None => {}
        }
    }

    /// Start the confirmation timer; the resume only fires if quorum still
    /// holds when it elapses (a break aborts the timer).
    fn arm_resume(&self, room_id: &str) {
        let engine = Arc::clone(&self.engine);
        let bus = Arc::clone(&self.bus);
        let room = room_id.to_string();
        let delay = Duration::from_millis(self.config.confirm_ms);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.resume().await;
            info!(room_id = %room, "buffer quorum confirmed, resuming");
            bus.publish(PeerEvent::ResumePlay { room_id: room });
        });

        let mut rooms = self.rooms.lock().expect("gate state poisoned");
        let state = rooms.entry(room_id.to_string()).or_default();
        if let Some(prev) = state.confirm.replace(handle) {
            prev.abort();
        }
    }
}

impl Drop for BufferQuorumGate {
    fn drop(&mut self) {
        let mut rooms = self.shared.rooms.lock().expect("gate state poisoned");
        for (_, state) in rooms.drain() {
            if let Some(settle) = state.settle {
                settle.abort();
            }
            if let Some(confirm) = state.confirm {
                confirm.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;

    use matinee_store::MemoryStore;

    use crate::playback::{MediaController, PlaybackConfig};
    use crate::protocol::paths;

    #[derive(Default)]
    struct NullPlayer;

    #[async_trait]
    impl MediaController for NullPlayer {
        async fn play(&self) {}
        async fn pause(&self) {}
        async fn seek(&self, _seconds: f64) {}
        async fn current_time(&self) -> f64 {
            0.0
        }
        async fn set_guards(&self, _locked: bool) {}
    }

    struct Fixture {
        gate: Arc<BufferQuorumGate>,
        engine: Arc<PlaybackSyncEngine>,
        store: Arc<dyn SharedStore>,
        bus: Arc<PeerBus>,
    }

    async fn fixture(members: &[&str]) -> Fixture {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let bus = Arc::new(PeerBus::new(64));
        let subs = Arc::new(SubscriptionManager::new());
        let engine = Arc::new(PlaybackSyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&subs),
            Arc::new(NullPlayer),
            "u1",
            PlaybackConfig::default(),
        ));
        let gate = Arc::new(BufferQuorumGate::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            subs,
            Arc::clone(&engine),
            BufferConfig::default(),
        ));

        for m in members {
            store
                .set(
                    &paths::user("123456", m),
                    json!({"displayName": m, "joinedAt": 1}),
                )
                .await
                .unwrap();
        }
        gate.watch("123456").await;

        Fixture {
            gate,
            engine,
            store,
            bus,
        }
    }

    async fn write_statuses(store: &Arc<dyn SharedStore>, statuses: &[(&str, &str)]) {
        let mut fields = Map::new();
        for (uid, status) in statuses {
            fields.insert(uid.to_string(), json!(status));
        }
        store
            .update(&paths::buffer_status("123456"), fields)
            .await
            .unwrap();
    }

    fn drain_events(
        rx: &mut tokio::sync::broadcast::Receiver<PeerEvent>,
    ) -> (usize, usize) {
        let mut resumes = 0;
        let mut blocks = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                PeerEvent::ResumePlay { .. } => resumes += 1,
                PeerEvent::BlockPlay { .. } => blocks += 1,
                _ => {}
            }
        }
        (resumes, blocks)
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_statuses_block_playback() {
        let f = fixture(&["u1", "u2"]).await;
        let mut rx = f.bus.subscribe();

        write_statuses(&f.store, &[("u1", "ready"), ("u2", "buffering")]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (resumes, blocks) = drain_events(&mut rx);
        assert_eq!(resumes, 0);
        assert!(blocks >= 1);
        assert!(f.engine.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn unanimous_ready_resumes_exactly_once() {
        let f = fixture(&["u1", "u2"]).await;
        let mut rx = f.bus.subscribe();

        write_statuses(&f.store, &[("u1", "ready"), ("u2", "ready")]).await;
        tokio::time::sleep(Duration::from_millis(350)).await;

        let (resumes, _) = drain_events(&mut rx);
        assert_eq!(resumes, 1);
        assert!(!f.engine.is_locked());

        // Re-reporting ready while quorum is held does not re-arm.
        write_statuses(&f.store, &[("u1", "ready")]).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        let (resumes, _) = drain_events(&mut rx);
        assert_eq!(resumes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn quorum_break_inside_confirm_window_cancels_resume() {
        let f = fixture(&["u1", "u2"]).await;
        let mut rx = f.bus.subscribe();

        write_statuses(&f.store, &[("u1", "ready"), ("u2", "ready")]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        write_statuses(&f.store, &[("u2", "buffering")]).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (resumes, blocks) = drain_events(&mut rx);
        assert_eq!(resumes, 0);
        assert!(blocks >= 1);
        assert!(f.engine.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn departed_user_statuses_are_ignored() {
        let f = fixture(&["u1"]).await;
        let mut rx = f.bus.subscribe();

        // u9 left long ago; its stale status must not block quorum.
        write_statuses(&f.store, &[("u1", "ready"), ("u9", "buffering")]).await;
        tokio::time::sleep(Duration::from_millis(350)).await;

        let (resumes, blocks) = drain_events(&mut rx);
        assert_eq!(resumes, 1);
        assert_eq!(blocks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_window_sends_only_the_last_value() {
        let f = fixture(&["u1", "u2"]).await;

        f.gate.report_status("123456", "u1", BufferState::Buffering);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Within the window: replaces the pending write entirely.
        f.gate.report_status("123456", "u1", BufferState::Ready);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // First report was aborted; second has not settled yet.
        assert!(f
            .store
            .once(&paths::buffer_status_user("123456", "u1"))
            .await
            .unwrap()
            .is_null());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            f.store
                .once(&paths::buffer_status_user("123456", "u1"))
                .await
                .unwrap(),
            json!("ready")
        );
    }
}
