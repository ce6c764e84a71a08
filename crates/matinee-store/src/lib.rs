//! Shared key-value store abstraction for room coordination.
//!
//! The store is the only substrate peers coordinate through: slash-delimited
//! paths, last-write-wins on concurrent writers, change notifications per
//! path. No cross-path atomicity is offered or assumed anywhere above this
//! crate.

pub mod memory;
pub mod path;
pub mod store;
pub mod subscription;
pub mod write;

pub use memory::MemoryStore;
pub use path::StorePath;
pub use store::{EventKind, SharedStore, StoreChange, Watch};
pub use subscription::{Concern, SubscriptionManager};
pub use write::{best_effort, BestEffortOp};
