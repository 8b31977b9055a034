//! Immutable per-partition point allocation.

use std::collections::HashMap;

use url::Url;

/// One interval's point table. Built by the updater, swapped in wholesale,
/// and read lock-free by request threads until the next interval.
#[derive(Debug, Default)]
pub struct PointsTable {
    generation_id: u64,
    points: HashMap<Url, u32>,
    quarantined: Vec<Url>,
}

impl PointsTable {
    pub fn new(generation_id: u64, points: HashMap<Url, u32>, quarantined: Vec<Url>) -> Self {
        Self {
            generation_id,
            points,
            quarantined,
        }
    }

    pub fn generation_id(&self) -> u64 {
        self.generation_id
    }

    /// Points for a host, or `None` when the host was unknown at the last
    /// interval boundary.
    pub fn points(&self, uri: &Url) -> Option<u32> {
        self.points.get(uri).copied()
    }

    pub fn points_map(&self) -> &HashMap<Url, u32> {
        &self.points
    }

    pub fn quarantined(&self) -> &[Url] {
        &self.quarantined
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
