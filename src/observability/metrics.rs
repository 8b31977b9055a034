//! Metrics collection.
//!
//! # Responsibilities
//! - Define discovery metrics (announce outcomes, session churn, points)
//! - Keep metric updates off the hot path's lock footprint
//!
//! # Metrics
//! - `discovery_mark_up_total` (counter): mark-ups by cluster, outcome
//! - `discovery_mark_down_total` (counter): mark-downs by cluster, outcome
//! - `discovery_sessions_established_total` (counter)
//! - `discovery_sessions_expired_total` (counter)
//! - `discovery_connections_lost_total` (counter)
//! - `discovery_reconnect_delay_ms` (histogram): backoff delays applied
//! - `strategy_host_points` (gauge): current points by partition, uri
//! - `strategy_quarantined_hosts` (gauge): quarantine size by partition
//! - `strategy_dropped_requests_total` (counter): all-zero-point drops

use std::time::Duration;

/// Record a mark-up outcome.
pub fn record_mark_up(cluster: &str, ok: bool) {
    metrics::counter!(
        "discovery_mark_up_total",
        "cluster" => cluster.to_string(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record a mark-down outcome.
pub fn record_mark_down(cluster: &str, ok: bool) {
    metrics::counter!(
        "discovery_mark_down_total",
        "cluster" => cluster.to_string(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_session_established() {
    metrics::counter!("discovery_sessions_established_total").increment(1);
}

pub fn record_session_expired() {
    metrics::counter!("discovery_sessions_expired_total").increment(1);
}

pub fn record_connection_lost() {
    metrics::counter!("discovery_connections_lost_total").increment(1);
}

pub fn record_reconnect_delay(delay: Duration) {
    metrics::histogram!("discovery_reconnect_delay_ms").record(delay.as_millis() as f64);
}

/// Record one host's current point allocation.
pub fn record_host_points(partition_id: u32, uri: &url::Url, points: u32) {
    metrics::gauge!(
        "strategy_host_points",
        "partition" => partition_id.to_string(),
        "uri" => uri.to_string()
    )
    .set(points as f64);
}

pub fn record_quarantine_size(partition_id: u32, size: usize) {
    metrics::gauge!(
        "strategy_quarantined_hosts",
        "partition" => partition_id.to_string()
    )
    .set(size as f64);
}

/// Record a request dropped because every candidate sat at zero points.
pub fn record_dropped_request(partition_id: u32) {
    metrics::counter!(
        "strategy_dropped_requests_total",
        "partition" => partition_id.to_string()
    )
    .increment(1);
}
