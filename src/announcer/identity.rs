//! A server instance's advertised identity.

use std::collections::HashMap;

use thiserror::Error;
use url::Url;

use crate::store::{PartitionData, DEFAULT_PARTITION_ID};

/// Local validation failures. Raised synchronously, before any store
/// operation is scheduled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    #[error("weight must be non-negative, got {0}")]
    InvalidWeight(f64),

    #[error("single-weight update is ambiguous once non-default partitions are configured")]
    AmbiguousWeight,

    #[error("partition data must not be empty")]
    EmptyPartitionData,
}

/// What one announcer advertises: cluster, URI, per-partition weights, and
/// the do-not-load-balance flag. Mutations are local; they reach the store
/// on the next successful mark-up or retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerIdentity {
    cluster: String,
    uri: Url,
    partitions: HashMap<u32, PartitionData>,
    do_not_load_balance: bool,
}

impl ServerIdentity {
    /// New identity at unit weight in the default partition.
    pub fn new(cluster: impl Into<String>, uri: Url) -> Self {
        Self {
            cluster: cluster.into(),
            uri,
            partitions: HashMap::from([(DEFAULT_PARTITION_ID, PartitionData::new(1.0))]),
            do_not_load_balance: false,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn partitions(&self) -> &HashMap<u32, PartitionData> {
        &self.partitions
    }

    pub fn do_not_load_balance(&self) -> bool {
        self.do_not_load_balance
    }

    pub fn set_cluster(&mut self, cluster: impl Into<String>) {
        self.cluster = cluster.into();
    }

    pub fn set_uri(&mut self, uri: Url) {
        self.uri = uri;
    }

    pub(crate) fn set_do_not_load_balance(&mut self, flag: bool) {
        self.do_not_load_balance = flag;
    }

    /// Single-partition convenience. Fails fast once any non-default
    /// partition id has been configured.
    pub fn set_weight(&mut self, weight: f64) -> Result<(), IdentityError> {
        if weight < 0.0 {
            return Err(IdentityError::InvalidWeight(weight));
        }
        if self.partitions.keys().any(|&p| p != DEFAULT_PARTITION_ID) {
            return Err(IdentityError::AmbiguousWeight);
        }
        self.partitions
            .insert(DEFAULT_PARTITION_ID, PartitionData::new(weight));
        Ok(())
    }

    /// Replace the full partition-weight map.
    pub fn set_partition_data(
        &mut self,
        partitions: HashMap<u32, PartitionData>,
    ) -> Result<(), IdentityError> {
        if partitions.is_empty() {
            return Err(IdentityError::EmptyPartitionData);
        }
        if let Some(data) = partitions.values().find(|d| d.weight < 0.0) {
            return Err(IdentityError::InvalidWeight(data.weight));
        }
        self.partitions = partitions;
        Ok(())
    }
}
