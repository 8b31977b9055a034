//! Relative load balancing strategy.
//!
//! # Responsibilities
//! - Recompute per-partition point allocations once per interval from call
//!   tracker snapshots, comparing each host against the cluster average
//! - Answer per-request selection from the current table, lock-free
//!
//! # Design Decisions
//! - Bounded steps: points move at most `up_step`/`down_step` per interval
//!   toward the health-implied target, so one bad interval cannot zero a
//!   host and one good interval cannot fully restore it
//! - New hosts start at full trust (no evidence of degradation yet)
//! - Interval updates for one partition are serialized behind a mutex; the
//!   request path never takes it

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::broadcast;
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::StrategyConfig;
use crate::observability::metrics;
use crate::strategy::points::PointsTable;
use crate::strategy::quarantine::{CooldownProbe, QuarantineLedger, QuarantineProbe};
use crate::strategy::{LoadBalancerStrategy, PointsSnapshot, RequestContext};
use crate::tracking::{CallStats, TrackerClient};

/// The candidate set last observed for a partition, reused by background
/// ticks between requests.
struct CandidateSet {
    generation_id: u64,
    hosts: HashMap<Url, Arc<TrackerClient>>,
}

struct UpdateState {
    /// Consecutive intervals below the quarantine score threshold.
    bad_intervals: HashMap<Url, u32>,
    ledger: QuarantineLedger,
}

struct PartitionState {
    table: ArcSwap<PointsTable>,
    candidates: ArcSwap<CandidateSet>,
    update: tokio::sync::Mutex<UpdateState>,
}

/// Point-based strategy comparing hosts against the cluster average.
pub struct RelativeStrategy {
    config: StrategyConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn QuarantineProbe>,
    partitions: DashMap<u32, Arc<PartitionState>>,
}

impl RelativeStrategy {
    pub fn new(config: StrategyConfig) -> Arc<Self> {
        Self::with_clock_and_probe(config, SystemClock::new(), Arc::new(CooldownProbe))
    }

    /// Injectable clock and probe, for deterministic tests and transports
    /// with a real health check.
    pub fn with_clock_and_probe(
        config: StrategyConfig,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn QuarantineProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            probe,
            partitions: DashMap::new(),
        })
    }

    /// Drive interval recomputation until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.config.update_interval_ms,
            "Strategy updater starting"
        );
        let mut ticker = tokio::time::interval(self.config.update_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let partition_ids: Vec<u32> =
                        self.partitions.iter().map(|entry| *entry.key()).collect();
                    for partition_id in partition_ids {
                        self.update_partition(partition_id).await;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Strategy updater received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Register the candidate set for a partition without selecting.
    pub fn observe_hosts(
        &self,
        partition_id: u32,
        generation_id: u64,
        candidates: &HashMap<Url, Arc<TrackerClient>>,
    ) {
        let part = self.partition(partition_id);
        self.observe(&part, generation_id, candidates);
    }

    /// Recompute one partition's points from this interval's tracker stats.
    /// Serialized per partition; concurrent callers queue behind the lock.
    pub async fn update_partition(&self, partition_id: u32) {
        let part = self.partition(partition_id);
        let candidates = part.candidates.load_full();
        let hosts = &candidates.hosts;

        let mut st = part.update.lock().await;
        let now_ms = self.clock.now_ms();
        let old = part.table.load_full();
        let cfg = &self.config;

        let harvested: HashMap<&Url, CallStats> = hosts
            .iter()
            .map(|(uri, client)| (uri, client.tracker().harvest()))
            .collect();

        // Cluster-wide average latency, weighted by call volume.
        let mut latency_sum = 0.0;
        let mut total_calls = 0u64;
        for stats in harvested.values() {
            if stats.call_count > 0 {
                latency_sum += stats.avg_latency_ms * stats.call_count as f64;
                total_calls += stats.call_count;
            }
        }
        let cluster_avg_latency = if total_calls > 0 {
            latency_sum / total_calls as f64
        } else {
            0.0
        };

        let quarantine_cap =
            (hosts.len() as f64 * cfg.quarantine.max_fraction).floor() as usize;
        let mut points: HashMap<Url, u32> = HashMap::with_capacity(hosts.len());

        for (uri, client) in hosts {
            let full = self.full_points(client, partition_id);
            if full == 0 {
                // zero advertised weight: host does not serve this partition
                points.insert(uri.clone(), 0);
                continue;
            }
            if st.ledger.is_quarantined(uri) {
                points.insert(uri.clone(), 0);
                continue;
            }

            let stats = harvested.get(uri);
            let score = health_score(cfg, stats, cluster_avg_latency);

            if cfg.quarantine.enabled {
                if score < cfg.quarantine.score_threshold {
                    *st.bad_intervals.entry(uri.clone()).or_insert(0) += 1;
                } else {
                    st.bad_intervals.remove(uri);
                }
                let bad = st.bad_intervals.get(uri).copied().unwrap_or(0);
                if bad >= cfg.quarantine.bad_intervals && st.ledger.len() < quarantine_cap {
                    st.ledger.admit(uri.clone(), now_ms, cfg.quarantine.cooldown());
                    st.bad_intervals.remove(uri);
                    points.insert(uri.clone(), 0);
                    tracing::warn!(partition = partition_id, uri = %uri, score, "Host quarantined");
                    continue;
                }
            }

            let current = old.points(uri).unwrap_or(full) as i64;
            let target = (full as f64 * score).round() as i64;
            let delta = (target - current).clamp(-(cfg.down_step as i64), cfg.up_step as i64);
            let next = (current + delta).clamp(cfg.min_points as i64, full as i64) as u32;
            points.insert(uri.clone(), next);
        }

        // Cooldown releases, gated by the out-of-band probe.
        for uri in st.ledger.due(now_ms) {
            if !hosts.contains_key(&uri) {
                st.ledger.release(&uri);
                continue;
            }
            if self.probe.probe(&uri).await {
                st.ledger.release(&uri);
                st.bad_intervals.remove(&uri);
                let reentry = cfg.quarantine.reentry_points.max(1);
                points.insert(uri.clone(), reentry);
                tracing::info!(partition = partition_id, uri = %uri, points = reentry,
                    "Host released from quarantine");
            } else {
                st.ledger.extend(&uri, now_ms, cfg.quarantine.cooldown());
            }
        }

        st.bad_intervals.retain(|uri, _| hosts.contains_key(uri));
        st.ledger.retain_known(|uri| hosts.contains_key(uri));

        for (uri, &p) in &points {
            metrics::record_host_points(partition_id, uri, p);
        }
        metrics::record_quarantine_size(partition_id, st.ledger.len());

        tracing::debug!(
            partition = partition_id,
            hosts = points.len(),
            quarantined = st.ledger.len(),
            generation = candidates.generation_id,
            "Points recomputed"
        );

        part.table.store(Arc::new(PointsTable::new(
            candidates.generation_id,
            points,
            st.ledger.uris(),
        )));
    }

    fn partition(&self, partition_id: u32) -> Arc<PartitionState> {
        self.partitions
            .entry(partition_id)
            .or_insert_with(|| {
                Arc::new(PartitionState {
                    table: ArcSwap::from_pointee(PointsTable::default()),
                    candidates: ArcSwap::from_pointee(CandidateSet {
                        generation_id: 0,
                        hosts: HashMap::new(),
                    }),
                    update: tokio::sync::Mutex::new(UpdateState {
                        bad_intervals: HashMap::new(),
                        ledger: QuarantineLedger::default(),
                    }),
                })
            })
            .clone()
    }

    fn observe(
        &self,
        part: &PartitionState,
        generation_id: u64,
        candidates: &HashMap<Url, Arc<TrackerClient>>,
    ) {
        let seen = part.candidates.load();
        if seen.generation_id != generation_id || seen.hosts.len() != candidates.len() {
            part.candidates.store(Arc::new(CandidateSet {
                generation_id,
                hosts: candidates.clone(),
            }));
        }
    }

    /// Points a host holds at full trust for this partition.
    fn full_points(&self, client: &TrackerClient, partition_id: u32) -> u32 {
        (client.weight(partition_id) * self.config.max_points as f64).round() as u32
    }

    /// Points used for selection: table value, or full trust for hosts the
    /// table has not seen yet (added since the last interval boundary).
    fn selectable_points(
        &self,
        table: &PointsTable,
        client: &TrackerClient,
        partition_id: u32,
    ) -> u32 {
        table
            .points(client.uri())
            .unwrap_or_else(|| self.full_points(client, partition_id))
    }
}

impl LoadBalancerStrategy for RelativeStrategy {
    fn get_tracker_client(
        &self,
        ctx: &RequestContext,
        generation_id: u64,
        partition_id: u32,
        candidates: &HashMap<Url, Arc<TrackerClient>>,
    ) -> Option<Arc<TrackerClient>> {
        if candidates.is_empty() {
            return None;
        }
        let part = self.partition(partition_id);
        self.observe(&part, generation_id, candidates);
        let table = part.table.load_full();

        if let Some(target) = &ctx.target_host {
            let client = candidates.get(target)?;
            if self.selectable_points(&table, client, partition_id) > 0 {
                return Some(Arc::clone(client));
            }
            metrics::record_dropped_request(partition_id);
            return None;
        }

        let mut total: u64 = 0;
        let weighted: Vec<(&Arc<TrackerClient>, u64)> = candidates
            .values()
            .map(|client| {
                let p = self.selectable_points(&table, client, partition_id) as u64;
                total += p;
                (client, p)
            })
            .collect();

        if total == 0 {
            tracing::debug!(partition = partition_id, "All candidates at zero points, dropping request");
            metrics::record_dropped_request(partition_id);
            return None;
        }

        let mut roll = fastrand::u64(0..total);
        for (client, p) in weighted {
            if roll < p {
                return Some(Arc::clone(client));
            }
            roll -= p;
        }
        unreachable!("roll bounded by total")
    }

    fn points_snapshot(&self, partition_id: u32) -> PointsSnapshot {
        match self.partitions.get(&partition_id) {
            Some(part) => {
                let table = part.table.load();
                PointsSnapshot {
                    generation_id: table.generation_id(),
                    points: table.points_map().clone(),
                    quarantined: table.quarantined().to_vec(),
                }
            }
            None => PointsSnapshot::default(),
        }
    }
}

/// Health score in `[0, 1]` from one interval's stats.
///
/// Latency is judged relative to the cluster average, error rate and
/// server-reported load on their own; the worst signal wins.
fn health_score(cfg: &StrategyConfig, stats: Option<&CallStats>, cluster_avg_latency: f64) -> f64 {
    let Some(stats) = stats else { return 1.0 };
    let mut score: f64 = 1.0;

    if stats.call_count > 0 {
        if cluster_avg_latency > 0.0 {
            let ratio = stats.avg_latency_ms / cluster_avg_latency;
            score = score.min(penalty(
                ratio,
                cfg.degrade_latency_ratio,
                cfg.max_latency_ratio,
            ));
        }
        let error_rate = stats.error_count as f64 / stats.call_count as f64;
        score = score.min(penalty(error_rate, cfg.degrade_error_rate, cfg.max_error_rate));
    }

    if let Some(load) = stats.reported_load {
        score = score.min((1.0 - load).clamp(0.0, 1.0));
    }

    score
}

/// Linear falloff from 1 at `start` to 0 at `max`.
fn penalty(value: f64, start: f64, max: f64) -> f64 {
    if value <= start {
        1.0
    } else if value >= max {
        0.0
    } else {
        1.0 - (value - start) / (max - start)
    }
}
