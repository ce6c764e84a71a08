//! Tests for room membership.

use std::sync::Arc;

use serde_json::json;

use matinee_common::{epoch_ms, Identity, PeerBus, RoomError};
use matinee_store::{MemoryStore, SharedStore, SubscriptionManager};

use crate::protocol::paths;

use super::*;

fn signed_in(user_id: &str, name: &str) -> Identity {
    Identity::from_auth_session(user_id.into(), name.into(), "token".into())
}

fn directory() -> (RoomDirectory, Arc<dyn SharedStore>) {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let dir = RoomDirectory::new(
        Arc::clone(&store),
        Arc::new(PeerBus::new(64)),
        Arc::new(SubscriptionManager::new()),
        RoomConfig::default(),
    );
    (dir, store)
}

#[tokio::test]
async fn create_room_writes_host_and_roster() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");

    let room_id = dir.create_room(&ada).await.unwrap();
    assert_eq!(room_id.len(), 6);
    assert!(room_id.chars().all(|c| c.is_ascii_digit()));

    let room = store.once(&paths::room(&room_id)).await.unwrap();
    assert_eq!(room["host"], json!("u1"));
    assert_eq!(room["inSession"], json!(false));
    assert_eq!(room["users"]["u1"]["displayName"], json!("Ada"));
}

#[tokio::test]
async fn create_room_requires_sign_in() {
    let (dir, _store) = directory();
    let anon = Identity::generate("drifter");
    let err = dir.create_room(&anon).await.unwrap_err();
    assert!(matches!(err, RoomError::NotAuthenticated));
}

#[tokio::test]
async fn join_missing_room_fails() {
    let (dir, _store) = directory();
    let bea = signed_in("u2", "Bea");
    let err = dir.join_room(&bea, "000000").await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test]
async fn join_is_idempotent_for_members() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let room_id = dir.create_room(&ada).await.unwrap();

    dir.join_room(&ada, &room_id).await.unwrap();
    dir.join_room(&ada, &room_id).await.unwrap();

    let users = store.once(&paths::users(&room_id)).await.unwrap();
    assert_eq!(users.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn third_member_is_rejected() {
    let (dir, _store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");
    let cal = signed_in("u3", "Cal");

    let room_id = dir.create_room(&ada).await.unwrap();
    dir.join_room(&bea, &room_id).await.unwrap();

    let err = dir.join_room(&cal, &room_id).await.unwrap_err();
    assert!(matches!(err, RoomError::Full(_)));

    // A member joining again is still fine at capacity.
    dir.join_room(&bea, &room_id).await.unwrap();
}

#[tokio::test]
async fn leave_clears_membership_invite_and_session() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");

    let room_id = dir.create_room(&ada).await.unwrap();
    dir.join_room(&bea, &room_id).await.unwrap();

    store
        .set(&paths::active_invite(&room_id).child("createdBy"), json!("u1"))
        .await
        .unwrap();
    store
        .set(&paths::in_session(&room_id), json!(true))
        .await
        .unwrap();
    store
        .set(&paths::typing_user(&room_id, "u2"), json!(true))
        .await
        .unwrap();

    dir.leave_room("u2", &room_id).await;
    // Sub-writes are spawned; give them a tick to land.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let users = store.once(&paths::users(&room_id)).await.unwrap();
    assert!(!users.as_object().unwrap().contains_key("u2"));
    assert!(store.once(&paths::active_invite(&room_id)).await.unwrap().is_null());
    assert_eq!(store.once(&paths::in_session(&room_id)).await.unwrap(), json!(false));
    assert!(store
        .once(&paths::typing_user(&room_id, "u2"))
        .await
        .unwrap()
        .is_null());
    assert!(store
        .once(&paths::last_leave(&room_id, "u2"))
        .await
        .unwrap()
        .as_u64()
        .is_some());
    // Room is not empty, so no empty-room stamp.
    assert!(store
        .once(&paths::last_user_left_at(&room_id))
        .await
        .unwrap()
        .is_null());
}

#[tokio::test]
async fn departing_host_hands_the_room_over() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");

    let room_id = dir.create_room(&ada).await.unwrap();
    dir.join_room(&bea, &room_id).await.unwrap();

    dir.leave_room("u1", &room_id).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let room = store.once(&paths::room(&room_id)).await.unwrap();
    assert_eq!(room["host"], json!("u2"));
}

#[tokio::test]
async fn last_member_leaving_stamps_the_room() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let room_id = dir.create_room(&ada).await.unwrap();

    dir.leave_room("u1", &room_id).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(store
        .once(&paths::last_user_left_at(&room_id))
        .await
        .unwrap()
        .as_u64()
        .is_some());
}

#[tokio::test]
async fn rejoin_inside_window_readds_user() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");
    let room_id = dir.create_room(&ada).await.unwrap();

    store
        .set(
            &paths::last_leave(&room_id, "u2"),
            json!(epoch_ms() - 59_999),
        )
        .await
        .unwrap();

    let outcome = dir.rejoin_if_recently_kicked(&bea, &room_id).await.unwrap();
    assert_eq!(outcome, RejoinOutcome::Rejoined);

    let users = store.once(&paths::users(&room_id)).await.unwrap();
    assert!(users.as_object().unwrap().contains_key("u2"));
}

#[tokio::test]
async fn rejoin_outside_window_is_stale() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");
    let room_id = dir.create_room(&ada).await.unwrap();

    store
        .set(
            &paths::last_leave(&room_id, "u2"),
            json!(epoch_ms() - 60_001),
        )
        .await
        .unwrap();

    let outcome = dir.rejoin_if_recently_kicked(&bea, &room_id).await.unwrap();
    assert_eq!(outcome, RejoinOutcome::Stale);
}

#[tokio::test]
async fn rejoin_of_current_member_is_a_noop() {
    let (dir, store) = directory();
    let ada = signed_in("u1", "Ada");
    let room_id = dir.create_room(&ada).await.unwrap();

    let outcome = dir.rejoin_if_recently_kicked(&ada, &room_id).await.unwrap();
    assert_eq!(outcome, RejoinOutcome::Rejoined);

    let users = store.once(&paths::users(&room_id)).await.unwrap();
    assert_eq!(users.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn rejoin_without_prior_leave_is_stale() {
    let (dir, _store) = directory();
    let ada = signed_in("u1", "Ada");
    let bea = signed_in("u2", "Bea");
    let room_id = dir.create_room(&ada).await.unwrap();

    let outcome = dir.rejoin_if_recently_kicked(&bea, &room_id).await.unwrap();
    assert_eq!(outcome, RejoinOutcome::Stale);
}
