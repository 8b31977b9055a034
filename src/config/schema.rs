//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! discovery subsystem. All types derive Serde traits for deserialization
//! from config files. Durations are plain millisecond fields so configs stay
//! flat; typed accessors convert once at the call site.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the discovery subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Store connection lifecycle settings.
    pub connection: ConnectionConfig,

    /// Load-balancing strategy tuning.
    pub strategy: StrategyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Bound on a single connect attempt.
    pub connect_timeout_ms: u64,

    /// Bound on a single store operation.
    pub operation_timeout_ms: u64,

    /// Optional bound on `start()` overall; `None` waits for connectivity.
    pub start_timeout_ms: Option<u64>,

    /// How long shutdown waits for best-effort mark-downs.
    pub shutdown_timeout_ms: u64,

    /// Reconnect backoff base delay.
    pub backoff_base_ms: u64,

    /// Reconnect backoff cap.
    pub backoff_max_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            operation_timeout_ms: 10_000,
            start_timeout_ms: None,
            shutdown_timeout_ms: 5_000,
            backoff_base_ms: 100,
            backoff_max_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Load-balancing strategy tuning.
///
/// Every constant here is deployment tuning, not algorithm identity: the
/// algorithm only requires bounded-step convergence toward a health-implied
/// target within `[min_points, max_points]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Interval between point recomputations.
    pub update_interval_ms: u64,

    /// Points a unit-weight host holds at full trust.
    pub max_points: u32,

    /// Floor for degraded hosts (0 removes them from selection entirely).
    pub min_points: u32,

    /// Max points regained per interval.
    pub up_step: u32,

    /// Max points lost per interval.
    pub down_step: u32,

    /// Latency ratio (host avg / cluster avg) where degradation starts.
    pub degrade_latency_ratio: f64,

    /// Latency ratio where the health score reaches zero.
    pub max_latency_ratio: f64,

    /// Error rate where degradation starts.
    pub degrade_error_rate: f64,

    /// Error rate where the health score reaches zero.
    pub max_error_rate: f64,

    /// Quarantine sub-state settings.
    pub quarantine: QuarantineConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 5_000,
            max_points: 100,
            min_points: 0,
            up_step: 10,
            down_step: 20,
            degrade_latency_ratio: 1.3,
            max_latency_ratio: 3.0,
            degrade_error_rate: 0.1,
            max_error_rate: 0.5,
            quarantine: QuarantineConfig::default(),
        }
    }
}

impl StrategyConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Hard-cutoff quarantine for severely degraded hosts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuarantineConfig {
    pub enabled: bool,

    /// Health score below which an interval counts as "bad".
    pub score_threshold: f64,

    /// Consecutive bad intervals before quarantine.
    pub bad_intervals: u32,

    /// Cap on the fraction of a partition's hosts in quarantine at once.
    pub max_fraction: f64,

    /// Cool-down before a quarantined host is probed for re-entry.
    pub cooldown_ms: u64,

    /// Points granted on re-entry (minimal trust).
    pub reentry_points: u32,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            score_threshold: 0.2,
            bad_intervals: 3,
            max_fraction: 0.5,
            cooldown_ms: 30_000,
            reentry_points: 1,
        }
    }
}

impl QuarantineConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "dynamic_discovery=info".to_string(),
        }
    }
}
