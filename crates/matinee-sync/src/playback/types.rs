//! The media-player seam and playback configuration.

use async_trait::async_trait;

/// The locally playing video, as far as this crate is concerned.
///
/// The implementation owns the actual player plus the guard machinery:
/// the transparent click-blocking overlay over the controls and the
/// space-to-play keyboard interception (which must still let space through
/// when focus is in a text input). Both are installed while guards are on
/// and removed when they are lifted.
#[async_trait]
pub trait MediaController: Send + Sync {
    async fn play(&self);
    async fn pause(&self);
    async fn seek(&self, seconds: f64);
    async fn current_time(&self) -> f64;
    async fn set_guards(&self, locked: bool);
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Identical actions inside this window are not re-propagated.
    pub debounce_ms: u64,
    /// Remote positions within this distance of the local one do not seek.
    pub seek_threshold_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            seek_threshold_secs: 1.0,
        }
    }
}
