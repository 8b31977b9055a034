//! Per-host call statistics.
//!
//! # Responsibilities
//! - Track outstanding calls, completed calls, errors, and latency per host
//! - Hand the strategy one consistent snapshot per interval (harvest + reset)
//! - Carry an optional externally reported load score
//!
//! # Design Decisions
//! - Atomic counters only on the request path, no locks
//! - `CallGuard` is RAII: a guard dropped without an explicit outcome counts
//!   as a failed call, so abandoned requests degrade a host instead of
//!   silently vanishing
//! - The interval boundary is whoever calls `harvest`; the tracker itself
//!   has no timer

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use url::Url;

use crate::clock::Clock;
use crate::store::DEFAULT_PARTITION_ID;

const NO_REPORTED_LOAD: u64 = u64::MAX;

/// One interval's worth of call statistics for a single host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallStats {
    pub outstanding: u64,
    pub call_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    /// Load score reported by the server itself, in `[0, 1]`, if any.
    pub reported_load: Option<f64>,
}

/// Rolling interval counters for one host.
#[derive(Debug)]
pub struct CallTracker {
    clock: Arc<dyn Clock>,
    outstanding: AtomicU64,
    calls: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    /// f64 bits; `NO_REPORTED_LOAD` means unset.
    reported_load: AtomicU64,
}

impl CallTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            outstanding: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            reported_load: AtomicU64::new(NO_REPORTED_LOAD),
        })
    }

    /// Begin tracking one call. Outstanding count drops when the guard
    /// resolves (or is dropped).
    pub fn start_call(self: &Arc<Self>) -> CallGuard {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            tracker: Arc::clone(self),
            started_ms: self.clock.now_ms(),
            finished: false,
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Record a load score pushed by the server (e.g. in response headers).
    pub fn set_reported_load(&self, load: f64) {
        self.reported_load
            .store(load.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn clear_reported_load(&self) {
        self.reported_load.store(NO_REPORTED_LOAD, Ordering::Relaxed);
    }

    /// Take this interval's stats and reset the interval counters.
    /// Outstanding is a gauge and is read, not reset.
    pub fn harvest(&self) -> CallStats {
        let calls = self.calls.swap(0, Ordering::Relaxed);
        let errors = self.errors.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        let load_bits = self.reported_load.load(Ordering::Relaxed);
        CallStats {
            outstanding: self.outstanding.load(Ordering::Relaxed),
            call_count: calls,
            error_count: errors,
            avg_latency_ms: if calls > 0 {
                latency_sum as f64 / calls as f64
            } else {
                0.0
            },
            reported_load: if load_bits == NO_REPORTED_LOAD {
                None
            } else {
                Some(f64::from_bits(load_bits))
            },
        }
    }

    fn record(&self, started_ms: u64, error: bool) {
        // Saturating: a guard created before a counter reset must not wrap.
        let _ = self
            .outstanding
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
        self.calls.fetch_add(1, Ordering::Relaxed);
        if error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let latency = self.clock.now_ms().saturating_sub(started_ms);
        self.latency_sum_ms.fetch_add(latency, Ordering::Relaxed);
    }
}

/// RAII handle for one in-flight call.
#[derive(Debug)]
pub struct CallGuard {
    tracker: Arc<CallTracker>,
    started_ms: u64,
    finished: bool,
}

impl CallGuard {
    pub fn success(mut self) {
        self.finish(false);
    }

    pub fn failure(mut self) {
        self.finish(true);
    }

    fn finish(&mut self, error: bool) {
        if !self.finished {
            self.finished = true;
            self.tracker.record(self.started_ms, error);
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.finish(true);
    }
}

/// The selectable unit: one host URI, its per-partition weights, and its
/// call tracker.
#[derive(Debug)]
pub struct TrackerClient {
    uri: Url,
    partition_weights: HashMap<u32, f64>,
    tracker: Arc<CallTracker>,
}

impl TrackerClient {
    pub fn new(uri: Url, partition_weights: HashMap<u32, f64>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            uri,
            partition_weights,
            tracker: CallTracker::new(clock),
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Advertised weight for a partition. An empty weight map means an
    /// unpartitioned host at unit weight; a missing entry otherwise means
    /// the host does not serve the partition.
    pub fn weight(&self, partition_id: u32) -> f64 {
        if self.partition_weights.is_empty() && partition_id == DEFAULT_PARTITION_ID {
            return 1.0;
        }
        self.partition_weights.get(&partition_id).copied().unwrap_or(0.0)
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    pub fn start_call(&self) -> CallGuard {
        self.tracker.start_call()
    }
}
