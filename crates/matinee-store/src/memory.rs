//! In-memory `SharedStore` backend.
//!
//! Holds the whole tree as a `serde_json::Value` object and fans change
//! notifications out to subscribers. Used by tests and local single-host
//! runs; a networked backend can replace it behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use matinee_common::StoreError;

use crate::path::StorePath;
use crate::store::{EventKind, SharedStore, StoreChange, Watch};

const WATCH_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
    push_counter: u64,
}

struct Watcher {
    path: StorePath,
    kind: EventKind,
    tx: mpsc::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply already-resolved leaf writes and notify watchers.
    /// `writes` pairs a concrete path with its new value (`None` = delete).
    async fn apply(&self, writes: Vec<(StorePath, Option<Value>)>) {
        let mut inner = self.inner.write().await;
        let before = inner.root.clone();

        for (path, value) in &writes {
            match value {
                Some(v) => set_at(&mut inner.root, path, v.clone()),
                None => {
                    remove_at(&mut inner.root, path);
                }
            }
        }

        let written: Vec<StorePath> = writes.into_iter().map(|(p, _)| p).collect();
        notify(&mut inner, &written, &before);
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        // Writing Null deletes, matching the substrate this models.
        let write = if value.is_null() { None } else { Some(value) };
        self.apply(vec![(path.clone(), write)]).await;
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = {
            let mut inner = self.inner.write().await;
            inner.push_counter += 1;
            // Zero-padded so lexicographic key order is insertion order.
            format!("{:016}", inner.push_counter)
        };
        self.apply(vec![(path.child(&key), Some(value))]).await;
        Ok(key)
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let writes = fields
            .into_iter()
            .map(|(k, v)| {
                let write = if v.is_null() { None } else { Some(v) };
                (path.child(&k), write)
            })
            .collect();
        self.apply(writes).await;
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.apply(vec![(path.clone(), None)]).await;
        Ok(())
    }

    async fn once(&self, path: &StorePath) -> Result<Value, StoreError> {
        let inner = self.inner.read().await;
        Ok(value_at(&inner.root, path).cloned().unwrap_or(Value::Null))
    }

    async fn subscribe(&self, path: &StorePath, kind: EventKind) -> Watch {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut inner = self.inner.write().await;
        inner.watchers.push(Watcher {
            path: path.clone(),
            kind,
            tx,
        });
        Watch { rx }
    }
}

// ---------------------------------------------------------------------------
// Tree navigation
// ---------------------------------------------------------------------------

fn value_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.segments() {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

fn set_at(root: &mut Value, path: &StorePath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut cur = root;
    for seg in parents {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        cur = cur
            .as_object_mut()
            .expect("just ensured object")
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !cur.is_object() {
        *cur = Value::Object(Map::new());
    }
    cur.as_object_mut()
        .expect("just ensured object")
        .insert(last.to_string(), value);
}

fn remove_at(root: &mut Value, path: &StorePath) -> bool {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = Value::Object(Map::new());
        return true;
    };

    let mut cur = root;
    for seg in parents {
        match cur.as_object_mut().and_then(|m| m.get_mut(*seg)) {
            Some(next) => cur = next,
            None => return false,
        }
    }
    cur.as_object_mut()
        .map(|m| m.remove(*last).is_some())
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Notification fan-out
// ---------------------------------------------------------------------------

/// Compute and deliver changes for a batch of leaf writes.
///
/// Child events fire for writes addressed strictly below the subscribed
/// path; a `set` replacing the subscribed node wholesale only produces a
/// `ValueChanged`. Delivery is non-blocking; a full or closed subscriber
/// loses changes rather than stalling writers, and closed subscribers are
/// pruned.
fn notify(inner: &mut Inner, written: &[StorePath], before: &Value) {
    let after = inner.root.clone();

    inner.watchers.retain(|w| !w.tx.is_closed());

    for watcher in &inner.watchers {
        let changes = changes_for(watcher, written, before, &after);
        for change in changes {
            if let Err(e) = watcher.tx.try_send(change) {
                warn!(path = %watcher.path, "dropping store change: {e}");
            }
        }
    }
}

fn changes_for(
    watcher: &Watcher,
    written: &[StorePath],
    before: &Value,
    after: &Value,
) -> Vec<StoreChange> {
    match watcher.kind {
        EventKind::ValueChanged => {
            let related = written
                .iter()
                .any(|p| watcher.path.contains(p) || p.contains(&watcher.path));
            if !related {
                return Vec::new();
            }
            vec![StoreChange {
                path: watcher.path.clone(),
                key: None,
                value: value_at(after, &watcher.path).cloned().unwrap_or(Value::Null),
            }]
        }
        EventKind::ChildAdded | EventKind::ChildChanged => {
            let mut keys: Vec<String> = Vec::new();
            for p in written {
                if let Some(key) = watcher.path.child_key_of(p) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }

            let mut changes = Vec::new();
            for key in keys {
                let child_path = watcher.path.child(&key);
                let existed = value_at(before, &child_path).is_some();
                let now = value_at(after, &child_path);
                let wanted = match (watcher.kind, existed, now) {
                    (EventKind::ChildAdded, false, Some(v)) => Some(v),
                    (EventKind::ChildChanged, true, Some(v))
                        if value_at(before, &child_path) != Some(v) =>
                    {
                        Some(v)
                    }
                    _ => None,
                };
                if let Some(value) = wanted {
                    changes.push(StoreChange {
                        path: watcher.path.clone(),
                        key: Some(key),
                        value: value.clone(),
                    });
                }
            }
            changes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> StorePath {
        StorePath::new(p)
    }

    #[tokio::test]
    async fn set_and_once_roundtrip() {
        let store = MemoryStore::new();
        store
            .set(&path("rooms/123456/host"), json!("u1"))
            .await
            .unwrap();

        let host = store.once(&path("rooms/123456/host")).await.unwrap();
        assert_eq!(host, json!("u1"));

        let room = store.once(&path("rooms/123456")).await.unwrap();
        assert_eq!(room, json!({ "host": "u1" }));
    }

    #[tokio::test]
    async fn absent_path_reads_null() {
        let store = MemoryStore::new();
        let v = store.once(&path("rooms/999999")).await.unwrap();
        assert!(v.is_null());
    }

    #[tokio::test]
    async fn set_null_deletes() {
        let store = MemoryStore::new();
        store.set(&path("rooms/1/flag"), json!(true)).await.unwrap();
        store.set(&path("rooms/1/flag"), Value::Null).await.unwrap();
        assert!(store.once(&path("rooms/1/flag")).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn push_keys_are_ordered() {
        let store = MemoryStore::new();
        let log = path("rooms/123456/playerState");
        let k1 = store.push(&log, json!({"action": "play"})).await.unwrap();
        let k2 = store.push(&log, json!({"action": "pause"})).await.unwrap();
        assert!(k1 < k2);

        let entries = store.once(&log).await.unwrap();
        let keys: Vec<&String> = entries.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec![&k1, &k2]);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryStore::new();
        let room = path("rooms/123456");
        store.set(&room.child("inSession"), json!(false)).await.unwrap();

        let mut fields = Map::new();
        fields.insert("inSession".into(), json!(true));
        fields.insert("lastUserLeftAt".into(), Value::Null);
        store.update(&room, fields).await.unwrap();

        assert_eq!(store.once(&room.child("inSession")).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = MemoryStore::new();
        store.remove(&path("rooms/123456/activeInvite")).await.unwrap();
        store
            .set(&path("rooms/123456/activeInvite/createdBy"), json!("u1"))
            .await
            .unwrap();
        store.remove(&path("rooms/123456/activeInvite")).await.unwrap();
        store.remove(&path("rooms/123456/activeInvite")).await.unwrap();
        assert!(store
            .once(&path("rooms/123456/activeInvite"))
            .await
            .unwrap()
            .is_null());
    }

    #[tokio::test]
    async fn value_changed_fires_for_descendant_writes() {
        let store = MemoryStore::new();
        let mut watch = store
            .subscribe(&path("rooms/123456/users"), EventKind::ValueChanged)
            .await;

        store
            .set(
                &path("rooms/123456/users/u1"),
                json!({"displayName": "Ada", "joinedAt": 1}),
            )
            .await
            .unwrap();

        let change = watch.rx.recv().await.unwrap();
        assert_eq!(change.path, path("rooms/123456/users"));
        assert!(change.value.as_object().unwrap().contains_key("u1"));
    }

    #[tokio::test]
    async fn value_changed_fires_null_on_removal() {
        let store = MemoryStore::new();
        store
            .set(&path("rooms/123456/activeInvite/createdBy"), json!("u1"))
            .await
            .unwrap();
        let mut watch = store
            .subscribe(&path("rooms/123456/activeInvite"), EventKind::ValueChanged)
            .await;

        store.remove(&path("rooms/123456/activeInvite")).await.unwrap();

        let change = watch.rx.recv().await.unwrap();
        assert!(change.value.is_null());
    }

    #[tokio::test]
    async fn child_added_fires_only_for_new_children() {
        let store = MemoryStore::new();
        let log = path("rooms/123456/playerState");
        let mut watch = store.subscribe(&log, EventKind::ChildAdded).await;

        let key = store.push(&log, json!({"action": "play", "time": 3.0})).await.unwrap();
        let change = watch.rx.recv().await.unwrap();
        assert_eq!(change.key.as_deref(), Some(key.as_str()));
        assert_eq!(change.value["action"], json!("play"));

        // Mutating the same child again is not a new child.
        store
            .set(&log.child(&key).child("time"), json!(4.0))
            .await
            .unwrap();
        assert!(watch.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn child_changed_fires_only_for_existing_children() {
        let store = MemoryStore::new();
        let statuses = path("rooms/123456/bufferStatus");
        store.set(&statuses.child("u1"), json!("buffering")).await.unwrap();

        let mut watch = store.subscribe(&statuses, EventKind::ChildChanged).await;

        // New child: no child-changed.
        store.set(&statuses.child("u2"), json!("ready")).await.unwrap();
        assert!(watch.rx.try_recv().is_err());

        // Existing child modified: fires.
        store.set(&statuses.child("u1"), json!("ready")).await.unwrap();
        let change = watch.rx.recv().await.unwrap();
        assert_eq!(change.key.as_deref(), Some("u1"));
        assert_eq!(change.value, json!("ready"));
    }

    #[tokio::test]
    async fn dropped_watch_is_pruned() {
        let store = MemoryStore::new();
        let watch = store
            .subscribe(&path("rooms/123456"), EventKind::ValueChanged)
            .await;
        drop(watch);

        // The next write prunes the dead subscriber instead of erroring.
        store.set(&path("rooms/123456/host"), json!("u1")).await.unwrap();
        let inner = store.inner.read().await;
        assert!(inner.watchers.is_empty());
    }
}
