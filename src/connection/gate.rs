//! Submission gate between announcers and the coordination store.
//!
//! # Responsibilities
//! - Forward operations to the store while a session is live
//! - Queue operations submitted during a reconnection window and replay
//!   them exactly once against the new session
//! - Bound every store call with the configured operation timeout
//!
//! # Design Decisions
//! - Ownership transfer is the exactly-once mechanism: an operation lives in
//!   the queue or in a spawned task, never both
//! - The gate never resolves an operation twice; queued ops at close time
//!   fail with `Closed`

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::store::{CoordinationStore, PartitionData, StoreError};

/// One write against the coordination store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    AddOrUpdate {
        cluster: String,
        uri: Url,
        partitions: HashMap<u32, PartitionData>,
    },
    Remove {
        cluster: String,
        uri: Url,
    },
    SetProperty {
        cluster: String,
        uri: Url,
        key: String,
        value: serde_json::Value,
    },
}

/// Internal callback invoked with the operation's store-level outcome.
pub type OpCallback = Box<dyn FnOnce(Result<(), StoreError>) + Send + 'static>;

struct GateInner {
    connected: bool,
    closed: bool,
    queue: VecDeque<(StoreOp, OpCallback)>,
}

/// Shared submission point for all announcers under one connection manager.
pub struct StoreGate {
    store: Arc<dyn CoordinationStore>,
    inner: Mutex<GateInner>,
    op_timeout: Duration,
}

impl StoreGate {
    pub fn new(store: Arc<dyn CoordinationStore>, op_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: Mutex::new(GateInner {
                connected: false,
                closed: false,
                queue: VecDeque::new(),
            }),
            op_timeout,
        })
    }

    /// Submit one operation. Runs immediately when a session is live,
    /// queues otherwise. `done` is invoked exactly once either way.
    pub fn submit(self: &Arc<Self>, op: StoreOp, done: OpCallback) {
        {
            let mut gate = self.inner.lock().unwrap();
            if gate.closed {
                drop(gate);
                done(Err(StoreError::Closed));
                return;
            }
            if !gate.connected {
                gate.queue.push_back((op, done));
                return;
            }
        }
        self.launch(op, done);
    }

    /// Session established: drain the queue. Ops submitted concurrently
    /// either queued before the drain (replayed here) or saw `connected`
    /// and launched directly; no op runs twice.
    pub(crate) fn open(self: &Arc<Self>) {
        let drained: Vec<(StoreOp, OpCallback)> = {
            let mut gate = self.inner.lock().unwrap();
            if gate.closed {
                return;
            }
            gate.connected = true;
            gate.queue.drain(..).collect()
        };
        if !drained.is_empty() {
            tracing::info!(replayed = drained.len(), "Replaying queued store operations");
        }
        for (op, done) in drained {
            self.launch(op, done);
        }
    }

    /// Session lost: new submissions queue until the next `open`.
    pub(crate) fn suspend(&self) {
        self.inner.lock().unwrap().connected = false;
    }

    /// Terminal close: queued ops resolve with `Closed`.
    pub(crate) fn close(&self) {
        let drained: Vec<(StoreOp, OpCallback)> = {
            let mut gate = self.inner.lock().unwrap();
            gate.closed = true;
            gate.connected = false;
            gate.queue.drain(..).collect()
        };
        for (_, done) in drained {
            done(Err(StoreError::Closed));
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    fn launch(self: &Arc<Self>, op: StoreOp, done: OpCallback) {
        let store = Arc::clone(&self.store);
        let timeout = self.op_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, execute(store.as_ref(), &op)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(timeout)),
            };
            done(result);
        });
    }
}

async fn execute(store: &dyn CoordinationStore, op: &StoreOp) -> Result<(), StoreError> {
    match op {
        StoreOp::AddOrUpdate {
            cluster,
            uri,
            partitions,
        } => store.add_or_update(cluster, uri, partitions).await,
        StoreOp::Remove { cluster, uri } => store.remove(cluster, uri).await,
        StoreOp::SetProperty {
            cluster,
            uri,
            key,
            value,
        } => {
            store
                .add_uri_specific_property(cluster, uri, key, value.clone())
                .await
        }
    }
}
