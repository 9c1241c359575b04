//! End-to-end run of a single coordinator node against the in-memory store:
//! worker boots, recovers to READY, checks in, and schedules its shard on the
//! next minute boundary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use takt_coordinator::{ClusterCoordinator, JobQueue, ManualClock};
use takt_core::config::ClusterConfig;
use takt_core::{AlertRule, AlertStatus};
use takt_store::MemStore;

// 19:05:00 UTC, clear of the cleanup and missed-alert boundaries.
const T0: i64 = 1_493_233_500;

fn cfg(node_id: &str) -> ClusterConfig {
    ClusterConfig {
        node_id: node_id.to_string(),
        alerting_enabled: true,
        execute_alerts: true,
        clustering_enabled: true,
        cleanup_period_hours: 24,
        missing_check_interval_mins: 10,
        missing_delay_secs: 600,
        missing_lookback_secs: 21_600,
        heartbeat_retention_secs: 86_400,
        annotation_retention_secs: 2_592_000,
    }
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

fn ready_count(store: &MemStore, heartbeat: i64) -> usize {
    store
        .heartbeats()
        .iter()
        .filter(|h| h.heartbeat == heartbeat && h.status == AlertStatus::Ready)
        .count()
}

#[tokio::test(start_paused = true)]
async fn fresh_node_checks_in_then_schedules_next_interval() {
    let store = Arc::new(MemStore::new(T0));
    for id in 0..3 {
        store.add_rule(AlertRule {
            id,
            name: format!("rule-{id}"),
            frequency_secs: 60,
            last_eval: Utc.timestamp_opt(T0 - 120, 0).unwrap(),
        });
    }

    let engine = Arc::new(JobQueue::new());
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(T0 + 30, 0).unwrap()));
    let shutdown = Arc::new(Notify::new());

    let coordinator = ClusterCoordinator::new(
        cfg("node-a"),
        store.clone(),
        store.clone(),
        engine.clone(),
        clock.clone(),
    );
    let handle = tokio::spawn(coordinator.run(shutdown.clone()));

    // Mid-minute the node recovers from OFF to READY and checks in for the
    // current interval.
    {
        let store = store.clone();
        wait_until(move || ready_count(&store, T0) == 1).await;
    }

    // Next minute boundary: the node finds its own READY row for the last
    // interval and dispatches its shard. Store time moves first so no tick
    // sees the new minute against the old store clock.
    store.set_now(T0 + 60);
    clock.set(Utc.timestamp_opt(T0 + 60, 0).unwrap());
    {
        let engine = engine.clone();
        wait_until(move || engine.len() == 3).await;
    }

    let mut ids: Vec<i64> = engine.drain().iter().map(|j| j.rule.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);

    // Graceful shutdown ends both loops cleanly on a single signal.
    shutdown.notify_waiters();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("coordinator did not shut down");
    assert!(result.unwrap().is_ok());
}
