use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events pushed to every peer currently viewing the watch surface.
///
/// Delivery is fire-and-forget and unordered across recipients; the UI
/// layer consumes these to refresh what it renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeerEvent {
    UpdateUserList {
        room_id: String,
    },
    NewChatMessage {
        room_id: String,
        message: serde_json::Value,
    },
    PlayerStateUpdated {
        room_id: String,
        state: serde_json::Value,
    },
    ActiveInviteUpdated {
        room_id: String,
        invite: Option<serde_json::Value>,
    },
    InSessionUpdated {
        room_id: String,
        in_session: bool,
    },
    /// Acceptance consensus reached: every peer should open the movie.
    StartSession {
        room_id: String,
        movie_url: String,
    },
    ResumePlay {
        room_id: String,
    },
    BlockPlay {
        room_id: String,
    },
    ResetCallIframe {
        room_id: String,
        requested_by: String,
    },
    #[serde(other)]
    Unknown,
}

pub struct PeerBus {
    sender: broadcast::Sender<PeerEvent>,
}

impl PeerBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all connected peers. Returns the number of
    /// receivers the event reached; zero receivers is not an error.
    pub fn publish(&self, event: PeerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for PeerBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = PeerBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PeerEvent::UpdateUserList {
            room_id: "123456".into(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PeerEvent::UpdateUserList { ref room_id } if room_id == "123456"));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = PeerBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PeerEvent::BlockPlay {
            room_id: "654321".into(),
        });

        assert!(matches!(rx1.recv().await.unwrap(), PeerEvent::BlockPlay { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), PeerEvent::BlockPlay { .. }));
    }

    #[tokio::test]
    async fn session_events_in_order_per_subscriber() {
        let bus = PeerBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PeerEvent::StartSession {
            room_id: "123456".into(),
            movie_url: "https://example.com/watch/42".into(),
        });
        bus.publish(PeerEvent::InSessionUpdated {
            room_id: "123456".into(),
            in_session: true,
        });

        let e1 = rx.recv().await.unwrap();
        assert!(
            matches!(e1, PeerEvent::StartSession { ref movie_url, .. } if movie_url.ends_with("/42"))
        );

        let e2 = rx.recv().await.unwrap();
        assert!(matches!(e2, PeerEvent::InSessionUpdated { in_session: true, .. }));
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus = PeerBus::new(16);
        let count = bus.publish(PeerEvent::ResumePlay {
            room_id: "000001".into(),
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn unknown_event_deserializes() {
        let json = r#"{"type":"SomeNewEventWeNeverHeardOf","data":null}"#;
        let event: PeerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, PeerEvent::Unknown));
    }
}
