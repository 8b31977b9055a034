//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path (many threads, lock-free reads):
//!     get_tracker_client(partition, candidates)
//!         → load current PointsTable (atomic snapshot)
//!         → weighted random pick over points
//!         → TrackerClient (caller opens a CallGuard around the call)
//!
//! Interval path (one tick at a time per partition):
//!     harvest CallTrackers → health score per host
//!         → bounded step toward score-implied target
//!         → quarantine crossings / releases
//!         → atomic swap of the PointsTable
//! ```
//!
//! # Design Decisions
//! - Points persist unchanged between interval boundaries; readers always
//!   see a complete table, never a partially updated one
//! - A zero-point host is never selected; an all-zero candidate set drops
//!   the request (returning `None`) instead of picking a known-bad host
//! - Hosts the table does not know yet are selectable at full trust

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::tracking::TrackerClient;

pub mod points;
pub mod quarantine;
pub mod relative;

pub use points::PointsTable;
pub use quarantine::{CooldownProbe, QuarantineProbe};
pub use relative::RelativeStrategy;

/// Per-request routing context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Pin selection to one host (honored only while it holds points).
    pub target_host: Option<Url>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target_host: None,
        }
    }

    pub fn with_target(target: Url) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target_host: Some(target),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a partition's current point allocation.
#[derive(Debug, Clone, Default)]
pub struct PointsSnapshot {
    pub generation_id: u64,
    pub points: HashMap<Url, u32>,
    pub quarantined: Vec<Url>,
}

/// Picks a host for each request from pre-computed point tables.
pub trait LoadBalancerStrategy: Send + Sync {
    /// Select a host for one request, or `None` to signal the caller to
    /// fail fast (total outage of the candidate set).
    ///
    /// Safe to call concurrently with interval recomputation; `candidates`
    /// may differ from the set the current points were computed for.
    fn get_tracker_client(
        &self,
        ctx: &RequestContext,
        generation_id: u64,
        partition_id: u32,
        candidates: &HashMap<Url, Arc<TrackerClient>>,
    ) -> Option<Arc<TrackerClient>>;

    /// Current point allocation, for observability and tests.
    fn points_snapshot(&self, partition_id: u32) -> PointsSnapshot;
}
