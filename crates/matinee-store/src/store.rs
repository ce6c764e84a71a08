//! The `SharedStore` trait and its change-notification types.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use matinee_common::StoreError;

use crate::path::StorePath;

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// What kind of change a subscription wants to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Any change at or below the subscribed path; delivers the whole value.
    ValueChanged,
    /// A direct child appeared under the subscribed path.
    ChildAdded,
    /// A direct child under the subscribed path was modified.
    ChildChanged,
}

/// A single change delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct StoreChange {
    /// The subscribed path this change was observed at.
    pub path: StorePath,
    /// Child key, for `ChildAdded` / `ChildChanged`.
    pub key: Option<String>,
    /// The value at the subscribed path (`ValueChanged`) or the child's
    /// value (`ChildAdded` / `ChildChanged`). `Null` means removed/absent.
    pub value: Value,
}

/// An active subscription. Dropping the watch ends delivery; the backend
/// prunes the dead sender on its next notification attempt.
pub struct Watch {
    pub rx: mpsc::Receiver<StoreChange>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// A key-path-addressed shared store with change notifications.
///
/// Concurrent writers race last-write-wins; there is no cross-path
/// atomicity. Everything above this trait is written to tolerate that:
/// idempotent writes, read-then-conditional-write barriers, and periodic
/// sweeps that self-heal missed cleanup.
///
/// `subscribe` does not replay pre-existing children for `ChildAdded`;
/// listeners are expected to be started before the writes they care about.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Write `value` at `path`, replacing whatever was there.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Append `value` under `path` with a generated, ordered key.
    /// Returns the generated key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    /// Merge `fields` into the object at `path`, field by field.
    async fn update(
        &self,
        path: &StorePath,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Delete the value at `path`. Removing an absent path is a no-op.
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Read the value at `path` once. Absent paths read as `Null`.
    async fn once(&self, path: &StorePath) -> Result<Value, StoreError>;

    /// Subscribe to changes at `path`.
    async fn subscribe(&self, path: &StorePath, kind: EventKind) -> Watch;
}
