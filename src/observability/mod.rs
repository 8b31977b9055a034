//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Metrics go through the `metrics` facade; exposition belongs to the host
//! - Metric updates are cheap (atomic increments)

pub mod logging;
pub mod metrics;
