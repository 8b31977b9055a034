//! Availability announcement for one server URI.
//!
//! # Responsibilities
//! - Own one URI's desired state (up/down, per-partition weights)
//! - Publish mark-up / mark-down operations through the store gate
//! - Supersede racing operations so every caller gets exactly one terminal
//!   signal (success, error, or cancellation)
//!
//! # State Transitions
//! ```text
//! idle ──submit──▶ in-flight ──store ack──▶ idle
//!                     │
//!                     └─ newer submit: cancel active callback, queue the
//!                        newcomer as the single "next" op (canceling any
//!                        previously queued one), issue it on ack
//! ```
//!
//! # Design Decisions
//! - At most one operation is active against the store per announcer;
//!   last writer wins under flapping up/down calls
//! - The announcer never retries or backs off by itself; connectivity
//!   failures surface to the caller, recovery belongs to the manager
//! - Weight changes apply on the next mark-up or retry, never retroactively

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::callback::Completion;
use crate::connection::gate::{StoreGate, StoreOp};
use crate::observability::metrics;
use crate::store::{PartitionData, StoreError, PROP_DO_NOT_LOAD_BALANCE};

pub mod identity;

pub use identity::{IdentityError, ServerIdentity};

/// Which operation a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Up,
    Down,
}

/// The last state acknowledged by the store for this URI.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedState {
    pub up: bool,
    pub partitions: HashMap<u32, PartitionData>,
}

struct InFlight {
    kind: OpKind,
    generation: u64,
    submitted_at: std::time::Instant,
    /// Snapshot the op carried; becomes the published state on ack.
    partitions: HashMap<u32, PartitionData>,
    /// Taken when the op is superseded.
    done: Option<Completion>,
}

struct Queued {
    kind: OpKind,
    done: Completion,
}

struct AnnouncerState {
    identity: ServerIdentity,
    published: Option<PublishedState>,
    last_requested: Option<OpKind>,
    in_flight: Option<InFlight>,
    next: Option<Queued>,
    generation: u64,
}

/// Publishes one server URI's availability into the coordination store.
pub struct Announcer {
    gate: Arc<StoreGate>,
    state: Mutex<AnnouncerState>,
}

impl Announcer {
    pub fn new(gate: Arc<StoreGate>, identity: ServerIdentity) -> Arc<Self> {
        Arc::new(Self {
            gate,
            state: Mutex::new(AnnouncerState {
                identity,
                published: None,
                last_requested: None,
                in_flight: None,
                next: None,
                generation: 0,
            }),
        })
    }

    /// Publish the current identity as "up". Re-publishing while already up
    /// pushes the latest weights.
    pub fn mark_up(self: &Arc<Self>, done: Completion) {
        self.submit(OpKind::Up, done);
    }

    /// Remove this URI's advertisement. Marking down an absent entry is a
    /// store-level no-op and succeeds.
    pub fn mark_down(self: &Arc<Self>, done: Completion) {
        self.submit(OpKind::Down, done);
    }

    /// Re-issue whichever operation was last requested, reading the identity
    /// fresh so weight changes made after a failure are picked up.
    pub fn retry(self: &Arc<Self>, done: Completion) {
        let kind = self.state.lock().unwrap().last_requested;
        match kind {
            Some(kind) => self.submit(kind, done),
            None => done.resolve(Err(StoreError::BadData("no operation to retry".into()))),
        }
    }

    /// Advertise the do-not-load-balance flag. Independent of up/down state
    /// and of any pending mark-up/mark-down: a plain pass-through write.
    pub fn do_not_load_balance(self: &Arc<Self>, flag: bool, done: Completion) {
        let op = {
            let mut st = self.state.lock().unwrap();
            st.identity.set_do_not_load_balance(flag);
            StoreOp::SetProperty {
                cluster: st.identity.cluster().to_string(),
                uri: st.identity.uri().clone(),
                key: PROP_DO_NOT_LOAD_BALANCE.to_string(),
                value: serde_json::Value::Bool(flag),
            }
        };
        self.gate.submit(op, Box::new(move |result| done.resolve(result)));
    }

    // --- Local identity mutation (store untouched, effective on next op) ---

    pub fn set_weight(&self, weight: f64) -> Result<(), IdentityError> {
        self.state.lock().unwrap().identity.set_weight(weight)
    }

    pub fn set_partition_data(
        &self,
        partitions: HashMap<u32, PartitionData>,
    ) -> Result<(), IdentityError> {
        self.state.lock().unwrap().identity.set_partition_data(partitions)
    }

    pub fn set_cluster(&self, cluster: impl Into<String>) {
        self.state.lock().unwrap().identity.set_cluster(cluster);
    }

    pub fn set_uri(&self, uri: url::Url) {
        self.state.lock().unwrap().identity.set_uri(uri);
    }

    pub fn cluster(&self) -> String {
        self.state.lock().unwrap().identity.cluster().to_string()
    }

    pub fn uri(&self) -> url::Url {
        self.state.lock().unwrap().identity.uri().clone()
    }

    /// Last state acknowledged by the store, if any write succeeded yet.
    pub fn published(&self) -> Option<PublishedState> {
        self.state.lock().unwrap().published.clone()
    }

    /// Whether the most recent request was a mark-up.
    pub fn desired_up(&self) -> bool {
        self.state.lock().unwrap().last_requested == Some(OpKind::Up)
    }

    /// Re-publish after a new session, but only when no caller-driven op is
    /// pending (pending ops replay through the gate queue on their own).
    pub(crate) fn republish_if_up(self: &Arc<Self>) {
        let idle_and_up = {
            let st = self.state.lock().unwrap();
            st.last_requested == Some(OpKind::Up) && st.in_flight.is_none() && st.next.is_none()
        };
        if idle_and_up {
            tracing::debug!(cluster = %self.cluster(), uri = %self.uri(), "Re-publishing after session change");
            self.submit(OpKind::Up, Completion::discard());
        }
    }

    fn submit(self: &Arc<Self>, kind: OpKind, done: Completion) {
        let to_issue = {
            let mut st = self.state.lock().unwrap();
            st.last_requested = Some(kind);
            if st.in_flight.is_some() {
                // Supersede: the active op's caller and any queued op get a
                // cancellation; the newcomer becomes the single queued op.
                if let Some(active) = st.in_flight.as_mut() {
                    if let Some(prev) = active.done.take() {
                        prev.cancel();
                    }
                }
                if let Some(prev) = st.next.take() {
                    prev.done.cancel();
                }
                st.next = Some(Queued { kind, done });
                None
            } else {
                Some(Self::issue_locked(&mut st, kind, done))
            }
        };
        if let Some((generation, op)) = to_issue {
            self.dispatch(generation, op);
        }
    }

    /// Build the store op from the current identity and record it in flight.
    fn issue_locked(st: &mut AnnouncerState, kind: OpKind, done: Completion) -> (u64, StoreOp) {
        st.generation += 1;
        let generation = st.generation;
        let cluster = st.identity.cluster().to_string();
        let uri = st.identity.uri().clone();
        let partitions = st.identity.partitions().clone();
        let op = match kind {
            OpKind::Up => StoreOp::AddOrUpdate {
                cluster,
                uri,
                partitions: partitions.clone(),
            },
            OpKind::Down => StoreOp::Remove { cluster, uri },
        };
        st.in_flight = Some(InFlight {
            kind,
            generation,
            submitted_at: std::time::Instant::now(),
            partitions,
            done: Some(done),
        });
        (generation, op)
    }

    fn dispatch(self: &Arc<Self>, generation: u64, op: StoreOp) {
        let this = Arc::clone(self);
        self.gate
            .submit(op, Box::new(move |result| this.on_store_result(generation, result)));
    }

    fn on_store_result(self: &Arc<Self>, generation: u64, result: Result<(), StoreError>) {
        let (kind, elapsed_ms, done, to_issue) = {
            let mut st = self.state.lock().unwrap();
            let Some(active) = st.in_flight.take() else {
                tracing::warn!(generation, "Store result with no operation in flight");
                return;
            };
            if active.generation != generation {
                // Stale ack; put the real in-flight op back.
                st.in_flight = Some(active);
                return;
            }
            if result.is_ok() {
                st.published = Some(PublishedState {
                    up: active.kind == OpKind::Up,
                    partitions: active.partitions.clone(),
                });
            }
            let to_issue = st
                .next
                .take()
                .map(|queued| Self::issue_locked(&mut st, queued.kind, queued.done));
            let elapsed_ms = active.submitted_at.elapsed().as_millis() as u64;
            (active.kind, elapsed_ms, active.done, to_issue)
        };

        let cluster = self.cluster();
        let uri = self.uri();
        match (&result, kind) {
            (Ok(()), OpKind::Up) => {
                tracing::info!(cluster = %cluster, uri = %uri, elapsed_ms, "Marked up");
                metrics::record_mark_up(&cluster, true);
            }
            (Ok(()), OpKind::Down) => {
                tracing::info!(cluster = %cluster, uri = %uri, elapsed_ms, "Marked down");
                metrics::record_mark_down(&cluster, true);
            }
            (Err(e), _) => {
                tracing::warn!(cluster = %cluster, uri = %uri, error = %e,
                    retryable = e.is_retryable(), "Announce operation failed");
                match kind {
                    OpKind::Up => metrics::record_mark_up(&cluster, false),
                    OpKind::Down => metrics::record_mark_down(&cluster, false),
                }
            }
        }

        if let Some(done) = done {
            done.resolve(result);
        }
        if let Some((generation, op)) = to_issue {
            self.dispatch(generation, op);
        }
    }
}
