//! Coordination store interface.
//!
//! # Responsibilities
//! - Define the ephemeral key/value property store the announce layer writes
//!   availability advertisements into
//! - Classify store failures (retryable connectivity vs fatal)
//! - Surface session lifecycle events to the connection manager
//!
//! # Design Decisions
//! - Object-safe async trait so announcers and the connection manager share
//!   one `Arc<dyn CoordinationStore>` regardless of backing implementation
//! - Sessions are explicit: ops issued without a live session fail with a
//!   retryable error rather than silently buffering inside the store client
//! - Cancellation is its own error kind so superseded operations are
//!   distinguishable from store rejections

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

pub mod memory;
pub mod uri_properties;

pub use memory::MemoryStore;
pub use uri_properties::{PartitionData, UriProperties, DEFAULT_PARTITION_ID, PROP_DO_NOT_LOAD_BALANCE};

/// Identity of one store session. Ephemeral writes die with their session.
pub type SessionId = Uuid;

/// Connection lifecycle notifications from the store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(SessionId),
    SessionExpired,
    ConnectionLost,
}

/// Failure taxonomy for store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("connection to the coordination store was lost")]
    ConnectionLoss,

    #[error("coordination store session expired")]
    SessionExpired,

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation superseded by a newer request")]
    Canceled,

    #[error("store rejected the data: {0}")]
    BadData(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("store client is closed")]
    Closed,
}

impl StoreError {
    /// Connectivity failures the caller should `retry` after the connection
    /// manager re-establishes a session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLoss | StoreError::SessionExpired | StoreError::Timeout(_)
        )
    }

    /// True only for supersession, never for store failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Canceled)
    }
}

/// An ephemeral property store keyed `/<namespace>/uris/<cluster>`, holding a
/// merged map of URI -> partition weights plus URI-specific properties.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Establish a session. Suspends until the store is reachable; the
    /// connection manager bounds each attempt with its own timeout.
    async fn connect(&self) -> Result<SessionId, StoreError>;

    /// Close the client. Subsequent operations fail with [`StoreError::Closed`].
    async fn close(&self);

    /// Publish (or overwrite) one URI's partition weights under a cluster.
    async fn add_or_update(
        &self,
        cluster: &str,
        uri: &Url,
        partitions: &HashMap<u32, PartitionData>,
    ) -> Result<(), StoreError>;

    /// Remove one URI's advertisement. Removing an absent URI is a no-op.
    async fn remove(&self, cluster: &str, uri: &Url) -> Result<(), StoreError>;

    /// Attach a URI-specific property advertised alongside the weights.
    async fn add_uri_specific_property(
        &self,
        cluster: &str,
        uri: &Url,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Subscribe to session lifecycle events.
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
