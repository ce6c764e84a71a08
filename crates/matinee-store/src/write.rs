//! Best-effort writes.
//!
//! Cleanup and bookkeeping writes (invite deletion on leave, typing roster,
//! leave timestamps) are deliberately fire-and-forget: a failed write is
//! logged and left for the next sweep cycle to self-heal, never escalated
//! to the caller.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::path::StorePath;
use crate::store::SharedStore;

#[derive(Debug)]
pub enum BestEffortOp {
    Set(Value),
    Update(Map<String, Value>),
    Remove,
}

/// Spawn a write that logs on failure instead of returning it.
pub fn best_effort(
    store: Arc<dyn SharedStore>,
    path: StorePath,
    op: BestEffortOp,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match op {
            BestEffortOp::Set(value) => store.set(&path, value).await,
            BestEffortOp::Update(fields) => store.update(&path, fields).await,
            BestEffortOp::Remove => store.remove(&path).await,
        };
        if let Err(e) = result {
            warn!(path = %path, "best-effort write failed: {e}");
        }
    })
}
