//! Merged per-cluster view of announced URIs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Partition id used when the resource is unpartitioned.
pub const DEFAULT_PARTITION_ID: u32 = 0;

/// URI-specific property excluding a host from client-side load balancing.
pub const PROP_DO_NOT_LOAD_BALANCE: &str = "do-not-load-balance";

/// Weight of one URI within one partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionData {
    pub weight: f64,
}

impl PartitionData {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }
}

/// The merged map a cluster key resolves to: every announced URI with its
/// per-partition weights, plus URI-specific properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UriProperties {
    cluster: String,
    partitions: HashMap<Url, HashMap<u32, PartitionData>>,
    properties: HashMap<Url, HashMap<String, serde_json::Value>>,
}

impl UriProperties {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            partitions: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// URIs currently advertising weights under this cluster.
    pub fn uris(&self) -> impl Iterator<Item = &Url> {
        self.partitions.keys()
    }

    pub fn uri_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.partitions.contains_key(uri)
    }

    pub fn partitions_for(&self, uri: &Url) -> Option<&HashMap<u32, PartitionData>> {
        self.partitions.get(uri)
    }

    pub fn partition_weight(&self, uri: &Url, partition_id: u32) -> Option<f64> {
        self.partitions
            .get(uri)?
            .get(&partition_id)
            .map(|d| d.weight)
    }

    /// Overwrite one URI's full partition-weight map.
    pub fn set_partitions(&mut self, uri: Url, partitions: HashMap<u32, PartitionData>) {
        self.partitions.insert(uri, partitions);
    }

    pub fn set_property(&mut self, uri: Url, key: impl Into<String>, value: serde_json::Value) {
        self.properties.entry(uri).or_default().insert(key.into(), value);
    }

    pub fn property(&self, uri: &Url, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(uri)?.get(key)
    }

    /// Drop one URI's advertisement. Returns whether anything was removed.
    pub fn remove_uri(&mut self, uri: &Url) -> bool {
        self.properties.remove(uri);
        self.partitions.remove(uri).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.properties.is_empty()
    }
}
