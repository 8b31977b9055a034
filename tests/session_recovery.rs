//! Session lifecycle: startup against an unreachable store, expiration
//! recovery, and the exactly-once guarantee under a racing storm.

use std::time::Duration;

use dynamic_discovery::{
    Completion, ConnectionManager, MemoryStore, MultiCompletion, SessionStatus, StoreError,
};

mod common;

use common::{fast_connection_config, identity, started_manager, uri, wait_until};

#[tokio::test]
async fn test_start_waits_for_store_to_become_reachable() {
    let store = MemoryStore::new();
    store.set_reachable(false);

    let manager = ConnectionManager::new(store.clone(), fast_connection_config());
    let (done, handle) = Completion::new();
    manager.start(done);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ne!(manager.status(), SessionStatus::Disconnected);
    assert!(store.session().is_none());

    store.set_reachable(true);
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("start never resolved")
        .expect("start failed after store became reachable");
    assert!(matches!(manager.status(), SessionStatus::Connected(_)));
}

#[tokio::test]
async fn test_start_timeout_resolves_while_reconnection_continues() {
    let store = MemoryStore::new();
    store.set_reachable(false);

    let mut config = fast_connection_config();
    config.start_timeout_ms = Some(50);
    let manager = ConnectionManager::new(store.clone(), config);

    let (done, handle) = Completion::new();
    manager.start(done);
    let err = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, StoreError::Timeout(_)));

    // the manager keeps connecting in the background
    store.set_reachable(true);
    wait_until(Duration::from_secs(5), || {
        matches!(manager.status(), SessionStatus::Connected(_))
    })
    .await;
}

#[tokio::test]
async fn test_session_expiration_republishes_desired_up_state() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));
    announcer.set_weight(0.5).unwrap();

    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    handle.wait().await.unwrap();
    assert!(store.uris("c").unwrap().contains(&uri("http://h:1/")));

    // expiration wipes the ephemeral advertisement
    store.expire_session();
    // a new session is established and the desired-up state re-published
    wait_until(Duration::from_secs(5), || {
        store
            .uris("c")
            .map(|props| props.partition_weight(&uri("http://h:1/"), 0) == Some(0.5))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_ops_queued_during_reconnection_replay_exactly_once() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    // drop the session and wait for the manager to enter its reconnect
    // loop (the gate is suspended by then); the mark-up below queues
    store.set_reachable(false);
    wait_until(Duration::from_secs(5), || {
        manager.status() == SessionStatus::Connecting
    })
    .await;
    let (done, mut handle) = Completion::new();
    announcer.mark_up(done);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.try_wait().is_none(), "op must wait for the new session");

    store.set_reachable(true);
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(store.uris("c").unwrap().contains(&uri("http://h:1/")));
}

#[tokio::test]
async fn test_interleaved_storm_resolves_exactly_once_across_expiration() {
    const PAIRS: usize = 1_000;

    let store = MemoryStore::new();
    let manager = started_manager(&store).await;

    let announcers: Vec<_> = (0..PAIRS)
        .map(|i| manager.new_announcer(identity("storm", &format!("http://h-{}:80/", i))))
        .collect();

    let (done, handle) = Completion::new();
    let join = MultiCompletion::new(PAIRS * 2, done);

    for (i, announcer) in announcers.iter().enumerate() {
        announcer.mark_up(join.child());
        announcer.mark_down(join.child());
        if i == PAIRS / 2 {
            store.expire_session();
        }
    }

    // every submitted operation reaches exactly one terminal outcome; the
    // aggregate fires once, after all 2N resolutions
    tokio::time::timeout(Duration::from_secs(30), handle.wait())
        .await
        .expect("storm did not fully resolve")
        .ok();
    assert_eq!(join.remaining(), 0);

    // every pair ended on mark-down; once the dust settles nothing remains
    wait_until(Duration::from_secs(10), || {
        store.uris("storm").map(|p| p.uri_count()).unwrap_or(0) == 0
    })
    .await;
}

#[tokio::test]
async fn test_shutdown_marks_down_then_closes_exactly_once() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    handle.wait().await.unwrap();

    let (done, handle) = Completion::new();
    manager.shutdown(done);
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.uris("c").unwrap().uri_count(), 0);
    assert_eq!(manager.status(), SessionStatus::Disconnected);

    // the connection is gone for good
    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    assert_eq!(handle.wait().await, Err(StoreError::Closed));
}
