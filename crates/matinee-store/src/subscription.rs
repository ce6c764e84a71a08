//! Per-client listener registry.
//!
//! Each (room, concern) pair may have at most one active listener task per
//! client; re-subscribing tears down the previous listener first so a
//! callback is never delivered twice. This is the single most important
//! resource-lifecycle invariant in the system.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::debug;

// ---------------------------------------------------------------------------
// Concerns
// ---------------------------------------------------------------------------

/// The per-room concerns a client can hold a listener for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    Members,
    Invite,
    PlayerState,
    BufferStatus,
    ReadyUsers,
    Chat,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SubscriptionManager {
    active: Mutex<HashMap<(String, Concern), JoinHandle<()>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener task for (room, concern), aborting any previous
    /// listener for the same pair.
    pub fn start(&self, room_id: &str, concern: Concern, task: JoinHandle<()>) {
        let mut active = self.active.lock().expect("subscription registry poisoned");
        if let Some(prev) = active.insert((room_id.to_string(), concern), task) {
            debug!(room_id, ?concern, "replacing existing listener");
            prev.abort();
        }
    }

    /// Stop the listener for (room, concern). Idempotent; stopping a pair
    /// with no active listener is a no-op.
    pub fn stop(&self, room_id: &str, concern: Concern) {
        let mut active = self.active.lock().expect("subscription registry poisoned");
        if let Some(task) = active.remove(&(room_id.to_string(), concern)) {
            task.abort();
        }
    }

    /// Stop every listener attached to a room.
    pub fn stop_room(&self, room_id: &str) {
        let mut active = self.active.lock().expect("subscription registry poisoned");
        let keys: Vec<_> = active
            .keys()
            .filter(|(r, _)| r == room_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(task) = active.remove(&key) {
                task.abort();
            }
        }
    }

    /// Stop everything. Called on client teardown.
    pub fn stop_all(&self) {
        let mut active = self.active.lock().expect("subscription registry poisoned");
        for (_, task) in active.drain() {
            task.abort();
        }
    }

    pub fn is_active(&self, room_id: &str, concern: Concern) -> bool {
        self.active
            .lock()
            .expect("subscription registry poisoned")
            .contains_key(&(room_id.to_string(), concern))
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
