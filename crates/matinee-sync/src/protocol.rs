//! Record types that live in the shared store, and the paths they live at.
//!
//! Records are plain serde structs written as JSON; concurrent writers race
//! last-write-wins, so every record is designed to be safely re-applied.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use matinee_common::{epoch_ms, Identity};

// ---------------------------------------------------------------------------
// Store paths
// ---------------------------------------------------------------------------

/// Path builders for everything under `rooms/{roomId}/`.
pub mod paths {
    use matinee_store::StorePath;

    pub fn room(room_id: &str) -> StorePath {
        StorePath::new(&format!("rooms/{room_id}"))
    }

    pub fn users(room_id: &str) -> StorePath {
        room(room_id).child("users")
    }

    pub fn user(room_id: &str, user_id: &str) -> StorePath {
        users(room_id).child(user_id)
    }

    pub fn in_session(room_id: &str) -> StorePath {
        room(room_id).child("inSession")
    }

    pub fn active_invite(room_id: &str) -> StorePath {
        room(room_id).child("activeInvite")
    }

    pub fn accepted_invitee(room_id: &str, user_id: &str) -> StorePath {
        active_invite(room_id).child("acceptedInvitees").child(user_id)
    }

    pub fn player_state(room_id: &str) -> StorePath {
        room(room_id).child("playerState")
    }

    pub fn buffer_status(room_id: &str) -> StorePath {
        room(room_id).child("bufferStatus")
    }

    pub fn buffer_status_user(room_id: &str, user_id: &str) -> StorePath {
        buffer_status(room_id).child(user_id)
    }

    pub fn ready_users(room_id: &str) -> StorePath {
        room(room_id).child("readyUsers")
    }

    pub fn ready_user(room_id: &str, user_id: &str) -> StorePath {
        ready_users(room_id).child(user_id)
    }

    pub fn typing_user(room_id: &str, user_id: &str) -> StorePath {
        room(room_id).child("typing").child(user_id)
    }

    pub fn last_leave(room_id: &str, user_id: &str) -> StorePath {
        room(room_id).child("lastLeaves").child(user_id)
    }

    pub fn last_user_left_at(room_id: &str) -> StorePath {
        room(room_id).child("lastUserLeftAt")
    }

    pub fn reset_iframe(room_id: &str) -> StorePath {
        room(room_id).child("resetIframeFlag")
    }

    pub fn chat(room_id: &str) -> StorePath {
        room(room_id).child("chat")
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A room member as stored under `users/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub display_name: String,
    pub joined_at: u64,
}

impl RoomUser {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            display_name: identity.display_name.clone(),
            joined_at: epoch_ms(),
        }
    }
}

/// A playback action propagated between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    Play,
    Pause,
    Seek,
}

/// One appended `playerState` log entry. The writer id rides along so
/// peers can drop their own echoes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStateEntry {
    pub action: PlayerAction,
    pub time: f64,
    pub by: String,
}

/// Per-peer buffering status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    Buffering,
    Ready,
}

/// The active invite record under `activeInvite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    pub created_by: String,
    pub movie_url: String,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default)]
    pub accepted_invitees: HashMap<String, bool>,
}

impl InviteRecord {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }

    /// User ids that have accepted.
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.accepted_invitees
            .iter()
            .filter(|(_, accepted)| **accepted)
            .map(|(uid, _)| uid.as_str())
    }
}

/// One chat entry under `chat/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub body: String,
    pub sent_at: u64,
    /// System announcements (invites etc.) rather than typed messages.
    #[serde(default)]
    pub system: bool,
}

/// Flag asking every peer to reload its call iframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetIframeFlag {
    pub by: String,
    pub at: u64,
}

/// Extract member ids from a `users` object snapshot.
pub fn member_ids(users: &serde_json::Value) -> Vec<String> {
    users
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_are_rooted_at_rooms() {
        assert_eq!(paths::room("123456").as_str(), "rooms/123456");
        assert_eq!(
            paths::accepted_invitee("123456", "u2").as_str(),
            "rooms/123456/activeInvite/acceptedInvitees/u2"
        );
        assert_eq!(
            paths::buffer_status_user("123456", "u1").as_str(),
            "rooms/123456/bufferStatus/u1"
        );
    }

    #[test]
    fn invite_record_roundtrips_camel_case() {
        let invite = InviteRecord {
            created_by: "u1".into(),
            movie_url: "https://example.com/watch/42".into(),
            created_at: 1_000,
            expires_at: 121_000,
            accepted_invitees: HashMap::from([("u2".to_string(), true)]),
        };
        let value = serde_json::to_value(&invite).unwrap();
        assert_eq!(value["createdBy"], json!("u1"));
        assert_eq!(value["expiresAt"], json!(121_000));
        assert_eq!(value["acceptedInvitees"]["u2"], json!(true));

        let back: InviteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.accepted().collect::<Vec<_>>(), vec!["u2"]);
    }

    #[test]
    fn invite_expiry_is_strict() {
        let invite = InviteRecord {
            created_by: "u1".into(),
            movie_url: String::new(),
            created_at: 0,
            expires_at: 120_000,
            accepted_invitees: HashMap::new(),
        };
        assert!(!invite.is_expired(120_000));
        assert!(invite.is_expired(120_001));
    }

    #[test]
    fn rejected_acceptance_flags_do_not_count() {
        let invite = InviteRecord {
            created_by: "u1".into(),
            movie_url: String::new(),
            created_at: 0,
            expires_at: 1,
            accepted_invitees: HashMap::from([
                ("u2".to_string(), false),
                ("u3".to_string(), true),
            ]),
        };
        assert_eq!(invite.accepted().collect::<Vec<_>>(), vec!["u3"]);
    }

    #[test]
    fn player_action_serializes_lowercase() {
        assert_eq!(serde_json::to_value(PlayerAction::Play).unwrap(), json!("play"));
        assert_eq!(serde_json::to_value(PlayerAction::Seek).unwrap(), json!("seek"));
        let state: PlayerStateEntry =
            serde_json::from_value(json!({"action": "pause", "time": 12.5, "by": "u1"})).unwrap();
        assert_eq!(state.action, PlayerAction::Pause);
    }
}
