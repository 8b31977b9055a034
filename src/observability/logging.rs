//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for hosts and tests
//! - Respect RUST_LOG over the configured default filter
//!
//! # Design Decisions
//! - `try_init` so repeated calls (tests, embedding hosts) are harmless

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber with the given default filter.
///
/// The environment (`RUST_LOG`) wins over `default_filter`. Calling this
/// when a subscriber is already installed is a no-op.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
