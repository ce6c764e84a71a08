//! Playback sync: local events out, remote events in, echo suppression.

mod engine;
mod types;


pub use engine::PlaybackSyncEngine;
pub use types::{MediaController, PlaybackConfig};
