//! Room coordination for synchronized watch-together sessions.
//!
//! Everything here coordinates through the shared store only: membership,
//! the invite handshake with acceptance consensus, the ready barrier,
//! playback sync with echo suppression, and buffering quorum gating.

pub mod barrier;
pub mod buffer;
pub mod chat;
pub mod invite;
pub mod playback;
pub mod protocol;
pub mod room;

pub use barrier::ReadyBarrier;
pub use buffer::{BufferConfig, BufferQuorumGate};
pub use chat::ChatLog;
pub use invite::{AcceptancePolicy, InviteConfig, InviteCoordinator};
pub use playback::{MediaController, PlaybackConfig, PlaybackSyncEngine};
pub use protocol::{
    BufferState, ChatEntry, InviteRecord, PlayerAction, PlayerStateEntry, RoomUser,
};
pub use room::{RejoinOutcome, RoomConfig, RoomDirectory};
