//! Configuration and result types for the room directory.

/// Configuration for room membership handling.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum members per room.
    pub max_members: usize,
    /// Attempts at generating an unused 6-digit code before giving up.
    pub code_attempts: u32,
    /// How long after an involuntary departure a rejoin is honored.
    pub rejoin_window_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_members: 2,
            code_attempts: 5,
            rejoin_window_ms: 60_000,
        }
    }
}

/// Outcome of a rejoin attempt after a connection-loss cleanup removed the
/// user from the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinOutcome {
    /// The user is (back) in the roster.
    Rejoined,
    /// The departure was too long ago; a normal join is required.
    Stale,
}
