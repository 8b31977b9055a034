//! Load-balancer convergence and selection properties under a
//! deterministic clock.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use dynamic_discovery::clock::ManualClock;
use dynamic_discovery::config::StrategyConfig;
use dynamic_discovery::strategy::CooldownProbe;
use dynamic_discovery::{LoadBalancerStrategy, RelativeStrategy, RequestContext, TrackerClient};

mod common;

use common::uri;

fn client(clock: &Arc<ManualClock>, s: &str) -> Arc<TrackerClient> {
    TrackerClient::new(uri(s), HashMap::new(), clock.clone())
}

fn record_call(client: &TrackerClient, clock: &ManualClock, latency_ms: u64, ok: bool) {
    let guard = client.start_call();
    clock.advance_ms(latency_ms);
    if ok {
        guard.success();
    } else {
        guard.failure();
    }
}

fn strategy_with(config: StrategyConfig, clock: &Arc<ManualClock>) -> Arc<RelativeStrategy> {
    RelativeStrategy::with_clock_and_probe(config, clock.clone(), Arc::new(CooldownProbe))
}

#[tokio::test]
async fn test_slow_host_points_decrease_monotonically_bounded_by_step() {
    const INTERVALS: usize = 10;
    const DOWN_STEP: u32 = 5;

    let clock = ManualClock::new(0);
    let strategy = strategy_with(
        StrategyConfig {
            down_step: DOWN_STEP,
            ..Default::default()
        },
        &clock,
    );

    let hosts: Vec<Arc<TrackerClient>> = (1..=3)
        .map(|i| client(&clock, &format!("http://h-{}:80/", i)))
        .collect();
    let candidates: HashMap<Url, Arc<TrackerClient>> = hosts
        .iter()
        .map(|c| (c.uri().clone(), c.clone()))
        .collect();
    strategy.observe_hosts(0, 1, &candidates);

    let slow = &hosts[2];
    let mut previous = u32::MAX;
    for _ in 0..INTERVALS {
        // identical QPS; the third host runs at 5x the latency of the others
        for host in &hosts {
            let latency = if host.uri() == slow.uri() { 50 } else { 10 };
            for _ in 0..10 {
                record_call(host, &clock, latency, true);
            }
        }
        strategy.update_partition(0).await;

        let snapshot = strategy.points_snapshot(0);
        let current = snapshot.points[slow.uri()];
        assert!(current < previous, "points must keep decreasing, {current} vs {previous}");
        assert!(
            previous == u32::MAX || previous - current <= DOWN_STEP,
            "per-interval drop bounded by the step"
        );
        previous = current;
    }

    // the fast hosts never degraded
    let snapshot = strategy.points_snapshot(0);
    assert_eq!(snapshot.points[hosts[0].uri()], 100);
    assert_eq!(snapshot.points[hosts[1].uri()], 100);
}

#[tokio::test]
async fn test_zero_point_host_is_never_selected() {
    let clock = ManualClock::new(0);
    let strategy = strategy_with(
        StrategyConfig {
            // a single interval of pure errors zeroes a host
            down_step: 100,
            ..Default::default()
        },
        &clock,
    );

    let good = client(&clock, "http://good:80/");
    let bad = client(&clock, "http://bad:80/");
    let candidates = HashMap::from([
        (good.uri().clone(), good.clone()),
        (bad.uri().clone(), bad.clone()),
    ]);
    strategy.observe_hosts(0, 1, &candidates);

    for _ in 0..20 {
        record_call(&good, &clock, 10, true);
        record_call(&bad, &clock, 10, false);
    }
    strategy.update_partition(0).await;
    assert_eq!(strategy.points_snapshot(0).points[bad.uri()], 0);

    let ctx = RequestContext::new();
    for _ in 0..10_000 {
        let picked = strategy
            .get_tracker_client(&ctx, 1, 0, &candidates)
            .expect("one healthy host remains");
        assert_eq!(picked.uri(), good.uri());
    }
}

#[tokio::test]
async fn test_total_outage_returns_drop() {
    let clock = ManualClock::new(0);
    let strategy = strategy_with(
        StrategyConfig {
            down_step: 100,
            ..Default::default()
        },
        &clock,
    );

    let a = client(&clock, "http://a:80/");
    let b = client(&clock, "http://b:80/");
    let candidates = HashMap::from([
        (a.uri().clone(), a.clone()),
        (b.uri().clone(), b.clone()),
    ]);
    strategy.observe_hosts(0, 1, &candidates);

    for _ in 0..10 {
        record_call(&a, &clock, 10, false);
        record_call(&b, &clock, 10, false);
    }
    strategy.update_partition(0).await;

    let ctx = RequestContext::new();
    assert!(strategy.get_tracker_client(&ctx, 1, 0, &candidates).is_none());
}

#[tokio::test]
async fn test_host_added_between_intervals_is_selectable_at_full_trust() {
    let clock = ManualClock::new(0);
    let strategy = strategy_with(StrategyConfig::default(), &clock);

    let a = client(&clock, "http://a:80/");
    let only_a = HashMap::from([(a.uri().clone(), a.clone())]);
    strategy.observe_hosts(0, 1, &only_a);
    strategy.update_partition(0).await;

    // b appears before the next tick; selection must not error and must
    // give b proportional trust immediately
    let b = client(&clock, "http://b:80/");
    let with_b = HashMap::from([
        (a.uri().clone(), a.clone()),
        (b.uri().clone(), b.clone()),
    ]);

    let ctx = RequestContext::new();
    let mut b_picked = 0;
    for _ in 0..2_000 {
        let picked = strategy.get_tracker_client(&ctx, 2, 0, &with_b).unwrap();
        if picked.uri() == b.uri() {
            b_picked += 1;
        }
    }
    // both at 100 points: b should take roughly half the traffic
    assert!(b_picked > 500, "new host starved: {b_picked}/2000 picks");
}

#[tokio::test]
async fn test_weighted_hosts_split_traffic_proportionally() {
    let clock = ManualClock::new(0);
    let strategy = strategy_with(StrategyConfig::default(), &clock);

    let light = TrackerClient::new(uri("http://light:80/"), HashMap::from([(0, 0.25)]), clock.clone());
    let heavy = TrackerClient::new(uri("http://heavy:80/"), HashMap::from([(0, 1.0)]), clock.clone());
    let candidates = HashMap::from([
        (light.uri().clone(), light.clone()),
        (heavy.uri().clone(), heavy.clone()),
    ]);
    strategy.observe_hosts(0, 1, &candidates);
    strategy.update_partition(0).await;

    let snapshot = strategy.points_snapshot(0);
    assert_eq!(snapshot.points[light.uri()], 25);
    assert_eq!(snapshot.points[heavy.uri()], 100);

    let ctx = RequestContext::new();
    let mut heavy_picked = 0u32;
    for _ in 0..5_000 {
        let picked = strategy.get_tracker_client(&ctx, 1, 0, &candidates).unwrap();
        if picked.uri() == heavy.uri() {
            heavy_picked += 1;
        }
    }
    // expectation 80%; allow generous slack for randomness
    assert!(
        (3_600..=4_400).contains(&heavy_picked),
        "heavy host took {heavy_picked}/5000 picks"
    );
}
