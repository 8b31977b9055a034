//! Dynamic service discovery and load balancing.
//!
//! Server side: an [`Announcer`] publishes one URI's availability and
//! weights into a coordination store through a [`ConnectionManager`], which
//! owns the store session and replays state across session expirations.
//!
//! Client side: a [`RelativeStrategy`] turns per-host call statistics into
//! a point allocation once per interval and answers per-request selection
//! from the current table.
//!
//! ```text
//!  lifecycle events ─▶ announcer ─▶ connection (gate + session loop) ─▶ store
//!
//!  request path ─▶ strategy (points table) ─▶ tracking (call guards)
//!                        ▲                          │
//!                        └── interval recompute ◀───┘
//! ```

// Core subsystems
pub mod announcer;
pub mod connection;
pub mod store;

// Traffic management
pub mod strategy;
pub mod tracking;

// Cross-cutting concerns
pub mod callback;
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use announcer::{Announcer, IdentityError, ServerIdentity};
pub use callback::{Completion, CompletionHandle, MultiCompletion};
pub use config::DiscoveryConfig;
pub use connection::{ConnectionManager, SessionStatus};
pub use lifecycle::Shutdown;
pub use store::{
    CoordinationStore, MemoryStore, PartitionData, SessionEvent, StoreError, UriProperties,
};
pub use strategy::{LoadBalancerStrategy, RelativeStrategy, RequestContext};
pub use tracking::{CallTracker, TrackerClient};
