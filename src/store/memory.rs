//! In-process coordination store with real session semantics.
//!
//! # Responsibilities
//! - Back integration tests and local development without a remote store
//! - Model sessions faithfully: ops without a live session fail retryably,
//!   `expire_session` kills ephemeral guarantees and notifies subscribers
//! - Allow failure/latency injection per operation
//!
//! # Design Decisions
//! - `connect` suspends while the store is unreachable instead of failing,
//!   so manager startup can be exercised against an initially-down store
//! - State lives under one mutex, never held across an await

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use url::Url;
use uuid::Uuid;

use crate::store::{
    CoordinationStore, PartitionData, SessionEvent, SessionId, StoreError, UriProperties,
};

struct StoreState {
    session: Option<SessionId>,
    reachable: bool,
    closed: bool,
    clusters: HashMap<String, UriProperties>,
    fail_next: Option<StoreError>,
    op_delay: Option<Duration>,
}

/// An in-memory [`CoordinationStore`].
pub struct MemoryStore {
    state: Mutex<StoreState>,
    events: broadcast::Sender<SessionEvent>,
    reachability: Notify,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(StoreState {
                session: None,
                reachable: true,
                closed: false,
                clusters: HashMap::new(),
                fail_next: None,
                op_delay: None,
            }),
            events,
            reachability: Notify::new(),
        })
    }

    /// Kill the current session. Ephemeral writes vanish with it; in-flight
    /// and subsequent ops fail with [`StoreError::SessionExpired`] until a
    /// new session is established.
    pub fn expire_session(&self) {
        let had_session = {
            let mut st = self.state.lock().unwrap();
            let had = st.session.take().is_some();
            if had {
                st.clusters.clear();
            }
            had
        };
        if had_session {
            let _ = self.events.send(SessionEvent::SessionExpired);
        }
    }

    /// Toggle reachability. `connect` suspends while unreachable; going
    /// unreachable kills the session and its ephemeral writes.
    pub fn set_reachable(&self, reachable: bool) {
        let lost_session = {
            let mut st = self.state.lock().unwrap();
            st.reachable = reachable;
            if reachable {
                false
            } else if st.session.take().is_some() {
                st.clusters.clear();
                true
            } else {
                false
            }
        };
        if reachable {
            self.reachability.notify_waiters();
        } else if lost_session {
            let _ = self.events.send(SessionEvent::ConnectionLost);
        }
    }

    /// Fail the next submitted operation with the given error.
    pub fn fail_next_op(&self, err: StoreError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// Delay every operation by `delay` before it touches store state.
    pub fn set_op_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().op_delay = delay;
    }

    /// Read the merged view for a cluster, as a client-side query would.
    pub fn uris(&self, cluster: &str) -> Option<UriProperties> {
        self.state.lock().unwrap().clusters.get(cluster).cloned()
    }

    pub fn session(&self) -> Option<SessionId> {
        self.state.lock().unwrap().session
    }

    async fn before_op(&self) -> Result<(), StoreError> {
        let delay = self.state.lock().unwrap().op_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return Err(StoreError::Closed);
        }
        if let Some(err) = st.fail_next.take() {
            return Err(err);
        }
        if st.session.is_none() {
            return Err(if st.reachable {
                StoreError::SessionExpired
            } else {
                StoreError::ConnectionLoss
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn connect(&self) -> Result<SessionId, StoreError> {
        loop {
            let notified = self.reachability.notified();
            tokio::pin!(notified);
            // register before checking, so a reachability flip between the
            // check and the await cannot be lost
            notified.as_mut().enable();
            {
                let mut st = self.state.lock().unwrap();
                if st.closed {
                    return Err(StoreError::Closed);
                }
                if st.reachable {
                    let session = Uuid::new_v4();
                    st.session = Some(session);
                    drop(st);
                    let _ = self.events.send(SessionEvent::Connected(session));
                    return Ok(session);
                }
            }
            notified.await;
        }
    }

    async fn close(&self) {
        let mut st = self.state.lock().unwrap();
        st.closed = true;
        st.session = None;
        drop(st);
        self.reachability.notify_waiters();
    }

    async fn add_or_update(
        &self,
        cluster: &str,
        uri: &Url,
        partitions: &HashMap<u32, PartitionData>,
    ) -> Result<(), StoreError> {
        self.before_op().await?;
        let mut st = self.state.lock().unwrap();
        st.clusters
            .entry(cluster.to_string())
            .or_insert_with(|| UriProperties::new(cluster))
            .set_partitions(uri.clone(), partitions.clone());
        Ok(())
    }

    async fn remove(&self, cluster: &str, uri: &Url) -> Result<(), StoreError> {
        self.before_op().await?;
        let mut st = self.state.lock().unwrap();
        if let Some(props) = st.clusters.get_mut(cluster) {
            props.remove_uri(uri);
        }
        Ok(())
    }

    async fn add_uri_specific_property(
        &self,
        cluster: &str,
        uri: &Url,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.before_op().await?;
        let mut st = self.state.lock().unwrap();
        st.clusters
            .entry(cluster.to_string())
            .or_insert_with(|| UriProperties::new(cluster))
            .set_property(uri.clone(), key, value);
        Ok(())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
