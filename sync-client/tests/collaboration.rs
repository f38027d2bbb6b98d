//! Two operators editing the same floor plan over an in-process hub.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use floorsync_client::{
    FloorPlanSession, HubTransport, LocalHub, MockPersistence, SessionConfig, SessionSnapshot,
};
use floorsync_core::{ConflictResolutionStrategy, ConflictType, Resolution};
use floorsync_types::{FloorPlanId, MarkerChanges, MarkerDraft, MarkerType, PresenceUser};

type Session = FloorPlanSession<HubTransport, MockPersistence>;

async fn operator(
    hub: &LocalHub,
    id: &str,
    name: &str,
    strategy: ConflictResolutionStrategy,
) -> Session {
    let session = FloorPlanSession::new(
        Arc::new(hub.transport()),
        Arc::new(MockPersistence::new()),
        PresenceUser::new(id, name),
        FloorPlanId::from("plan-1"),
        SessionConfig::default().with_strategy(strategy),
    );
    session.connect("local").await.unwrap();
    session.join().await.unwrap();
    session
}

/// Poll a session until its snapshot satisfies `check`.
async fn eventually<F, Fut>(session: &Session, what: &str, check: F) -> SessionSnapshot
where
    F: Fn(SessionSnapshot) -> Fut,
    Fut: Future<Output = Option<SessionSnapshot>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(snapshot) = check(session.snapshot().await).await {
            return snapshot;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}: {:?}", session.snapshot().await);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn pair() -> (LocalHub, Session, Session) {
    let hub = LocalHub::new();
    let alice = operator(&hub, "alice", "Alice", ConflictResolutionStrategy::ServerAuthoritative).await;
    let bob = operator(&hub, "bob", "Bob", ConflictResolutionStrategy::Manual).await;
    (hub, alice, bob)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn presence_sees_both_operators() {
    let (hub, alice, bob) = pair().await;
    assert_eq!(hub.member_count("plan-1"), 2);

    // Alice joined before Bob; her editing toggle re-announces her.
    alice.set_editing(true).await.unwrap();

    let seen_by_bob = eventually(&bob, "alice on bob's side", |s| async move {
        (s.active_users.len() == 2).then_some(s)
    })
    .await;
    let alice_entry = seen_by_bob
        .active_users
        .iter()
        .find(|u| u.user_name == "Alice")
        .unwrap();
    assert!(alice_entry.is_editing);

    eventually(&alice, "bob on alice's side", |s| async move {
        (s.active_users.len() == 2).then_some(s)
    })
    .await;

    bob.leave().await.unwrap();
    eventually(&alice, "bob leaving", |s| async move {
        (s.active_users.len() == 1).then_some(s)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn added_marker_reaches_peer_once() {
    let (_hub, alice, bob) = pair().await;

    let id = alice
        .add_marker(MarkerDraft::new(MarkerType::FireExtinguisher, "Lobby", 25.0, 75.0))
        .await
        .unwrap();

    let on_bob = eventually(&bob, "marker on bob's side", |s| async move {
        (s.markers.len() == 1).then_some(s)
    })
    .await;
    assert_eq!(on_bob.markers[0].id, id);
    assert_eq!(on_bob.markers[0].position(), (25.0, 75.0));

    // Give the echo time to come back to Alice.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let on_alice = alice.snapshot().await;
    assert_eq!(on_alice.markers.len(), 1);
    assert_eq!(on_alice.pending, 0);
    assert!(on_alice.conflicts.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_moves_conflict_and_converge() {
    let (_hub, alice, bob) = pair().await;
    let id = alice
        .add_marker(MarkerDraft::new(MarkerType::EmergencyExit, "East exit", 50.0, 50.0))
        .await
        .unwrap();
    eventually(&bob, "marker on bob's side", |s| async move {
        (s.markers.len() == 1).then_some(s)
    })
    .await;

    // Bob moves first; Alice has no local edits and takes it as is.
    bob.update_marker(&id, MarkerChanges::new().position(10.0, 20.0))
        .await
        .unwrap();
    eventually(&alice, "bob's move on alice's side", |s| async move {
        (s.markers[0].position() == (10.0, 20.0)).then_some(s)
    })
    .await;

    // Alice moves while Bob's move is still unsaved: Bob must decide.
    alice
        .update_marker(&id, MarkerChanges::new().position(70.0, 80.0))
        .await
        .unwrap();
    let on_bob = eventually(&bob, "conflict on bob's side", |s| async move {
        (!s.conflicts.is_empty()).then_some(s)
    })
    .await;
    assert_eq!(on_bob.conflicts[0].conflict_type, ConflictType::Position);
    assert_eq!(on_bob.markers[0].position(), (10.0, 20.0));

    // Bob keeps his position; Alice's policy adopts it.
    bob.resolve_conflict(&id, Resolution::KeepLocal).await.unwrap();
    let on_alice = eventually(&alice, "resolution on alice's side", |s| async move {
        (s.markers[0].position() == (10.0, 20.0)).then_some(s)
    })
    .await;
    assert_eq!(on_alice.markers, bob.snapshot().await.markers);
    assert!(bob.snapshot().await.conflicts.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_delete_of_clean_marker_applies() {
    let (_hub, alice, bob) = pair().await;
    let id = alice
        .add_marker(MarkerDraft::new(MarkerType::Hazard, "Spill", 30.0, 30.0))
        .await
        .unwrap();
    eventually(&bob, "marker on bob's side", |s| async move {
        (s.markers.len() == 1).then_some(s)
    })
    .await;

    alice.delete_marker(&id).await.unwrap();

    eventually(&bob, "delete on bob's side", |s| async move {
        s.markers.is_empty().then_some(s)
    })
    .await;
}
