//! Mark-up / mark-down behavior against an in-memory coordination store.

use std::collections::HashMap;
use std::time::Duration;

use dynamic_discovery::store::{PartitionData, DEFAULT_PARTITION_ID};
use dynamic_discovery::{Completion, MemoryStore, StoreError};

mod common;

use common::{identity, started_manager, uri};

#[tokio::test]
async fn test_round_trip_partition_weights() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("cluster-1", "http://cluster-1/test"));

    announcer
        .set_partition_data(HashMap::from([
            (5, PartitionData::new(0.3)),
            (15, PartitionData::new(0.7)),
        ]))
        .unwrap();

    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    handle.wait().await.unwrap();

    let props = store.uris("cluster-1").unwrap();
    let u = uri("http://cluster-1/test");
    assert_eq!(props.partition_weight(&u, 5), Some(0.3));
    assert_eq!(props.partition_weight(&u, 15), Some(0.7));
    assert_eq!(props.partitions_for(&u).unwrap().len(), 2);
}

#[tokio::test]
async fn test_mark_down_supersedes_pending_mark_up() {
    let store = MemoryStore::new();
    // keep the first op in flight long enough to race it
    store.set_op_delay(Some(Duration::from_millis(50)));
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    let (up_done, up_handle) = Completion::new();
    announcer.mark_up(up_done);
    let (down_done, down_handle) = Completion::new();
    announcer.mark_down(down_done);

    let up_result = up_handle.wait().await.unwrap_err();
    assert!(up_result.is_cancellation(), "superseded op must cancel, got {up_result:?}");
    down_handle.wait().await.unwrap();

    // the later operation's outcome is authoritative
    assert!(!store.uris("c").map(|p| p.contains(&uri("http://h:1/"))).unwrap_or(false));
    assert!(!announcer.desired_up());
}

#[tokio::test]
async fn test_mark_up_supersedes_pending_mark_down() {
    let store = MemoryStore::new();
    store.set_op_delay(Some(Duration::from_millis(50)));
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    let (down_done, down_handle) = Completion::new();
    announcer.mark_down(down_done);
    let (up_done, up_handle) = Completion::new();
    announcer.mark_up(up_done);

    assert_eq!(down_handle.wait().await, Err(StoreError::Canceled));
    up_handle.wait().await.unwrap();

    assert!(store.uris("c").unwrap().contains(&uri("http://h:1/")));
    assert!(announcer.desired_up());
}

#[tokio::test]
async fn test_mark_down_when_absent_is_a_noop_success() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    let (done, handle) = Completion::new();
    announcer.mark_down(done);
    assert_eq!(handle.wait().await, Ok(()));
}

#[tokio::test]
async fn test_double_mark_up_keeps_only_latest_weight() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    announcer.set_weight(0.5).unwrap();
    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    handle.wait().await.unwrap();

    announcer.set_weight(1.5).unwrap();
    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    handle.wait().await.unwrap();

    let props = store.uris("c").unwrap();
    assert_eq!(props.uri_count(), 1);
    assert_eq!(
        props.partition_weight(&uri("http://h:1/"), DEFAULT_PARTITION_ID),
        Some(1.5)
    );
}

#[tokio::test]
async fn test_cluster_membership_scenario() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;

    // first instance marks up at weight 0.5
    let first = manager.new_announcer(identity("cluster-1", "http://cluster-1/test"));
    first.set_weight(0.5).unwrap();
    let (done, handle) = Completion::new();
    first.mark_up(done);
    handle.wait().await.unwrap();

    let props = store.uris("cluster-1").unwrap();
    assert_eq!(props.uri_count(), 1);
    assert_eq!(
        props.partition_weight(&uri("http://cluster-1/test"), DEFAULT_PARTITION_ID),
        Some(0.5)
    );

    // second instance joins at weight 1.5; both advertisements survive
    let second = manager.new_announcer(identity("cluster-1", "http://cluster-1/test2"));
    second.set_weight(1.5).unwrap();
    let (done, handle) = Completion::new();
    second.mark_up(done);
    handle.wait().await.unwrap();

    let props = store.uris("cluster-1").unwrap();
    assert_eq!(props.uri_count(), 2);
    assert_eq!(
        props.partition_weight(&uri("http://cluster-1/test"), DEFAULT_PARTITION_ID),
        Some(0.5)
    );
    assert_eq!(
        props.partition_weight(&uri("http://cluster-1/test2"), DEFAULT_PARTITION_ID),
        Some(1.5)
    );

    // first instance leaves; only the second remains
    let (done, handle) = Completion::new();
    first.mark_down(done);
    handle.wait().await.unwrap();

    let props = store.uris("cluster-1").unwrap();
    assert_eq!(props.uri_count(), 1);
    assert!(props.contains(&uri("http://cluster-1/test2")));
    assert!(!props.contains(&uri("http://cluster-1/test")));
}

#[tokio::test]
async fn test_fatal_store_error_propagates_without_retry_path() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    let announcer = manager.new_announcer(identity("c", "http://h:1/"));

    store.fail_next_op(StoreError::Unauthorized("acl denies write".into()));
    let (done, handle) = Completion::new();
    announcer.mark_up(done);
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err, StoreError::Unauthorized("acl denies write".into()));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_mark_up_then_aggregate_fan_out() {
    let store = MemoryStore::new();
    let manager = started_manager(&store).await;
    for i in 0..5 {
        manager.new_announcer(identity("c", &format!("http://h:{}/", i + 1)));
    }

    let (done, handle) = Completion::new();
    manager.mark_up_all(done);
    handle.wait().await.unwrap();
    assert_eq!(store.uris("c").unwrap().uri_count(), 5);

    let (done, handle) = Completion::new();
    manager.mark_down_all(done);
    handle.wait().await.unwrap();
    assert_eq!(store.uris("c").unwrap().uri_count(), 0);
}
