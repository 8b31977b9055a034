//! Shared fixtures for integration tests.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use dynamic_discovery::config::ConnectionConfig;
use dynamic_discovery::{Completion, ConnectionManager, MemoryStore, ServerIdentity};

/// Connection settings tuned for tests: short timeouts, fast backoff.
#[allow(dead_code)]
pub fn fast_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        connect_timeout_ms: 1_000,
        operation_timeout_ms: 1_000,
        start_timeout_ms: None,
        shutdown_timeout_ms: 1_000,
        backoff_base_ms: 10,
        backoff_max_ms: 50,
    }
}

pub fn uri(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[allow(dead_code)]
pub fn identity(cluster: &str, uri_str: &str) -> ServerIdentity {
    ServerIdentity::new(cluster, uri(uri_str))
}

/// Build a manager over the store and wait for its first session.
#[allow(dead_code)]
pub async fn started_manager(store: &Arc<MemoryStore>) -> Arc<ConnectionManager> {
    let manager = ConnectionManager::new(store.clone(), fast_connection_config());
    let (done, handle) = Completion::new();
    manager.start(done);
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("start did not resolve")
        .expect("start failed");
    manager
}

/// Poll until `check` passes or the deadline expires.
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(deadline: Duration, check: F) {
    let start = std::time::Instant::now();
    loop {
        if check() {
            return;
        }
        assert!(start.elapsed() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
