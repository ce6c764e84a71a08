pub mod errors;
pub mod events;
pub mod identity;
pub mod time;

pub use errors::{MatineeError, RoomError, SceneError, StoreError};
pub use events::{PeerBus, PeerEvent};
pub use identity::{Identity, PublicIdentity};
pub use time::epoch_ms;
