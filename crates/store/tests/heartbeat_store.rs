//! Check-in and cleanup semantics against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use takt_core::{AlertRule, AlertRunType, AlertStatus, HeartbeatRecord};
use takt_store::{HeartbeatStore, MemStore, Retention, RuleStore, StoreError};

const T0: i64 = 1_493_233_500; // minute-aligned

fn candidate(node_id: &str, status: AlertStatus, run_type: AlertRunType) -> HeartbeatRecord {
    HeartbeatRecord {
        node_id: node_id.to_string(),
        heartbeat: 0,
        part_id: 0,
        run_type,
        status,
    }
}

fn rule(id: i64, frequency_secs: i64, last_eval_epoch: i64) -> AlertRule {
    AlertRule {
        id,
        name: format!("rule-{id}"),
        frequency_secs,
        last_eval: Utc.timestamp_opt(last_eval_epoch, 0).unwrap(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_check_ins_assign_gapless_part_ids() {
    let store = Arc::new(MemStore::new(T0));
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .check_in(
                    &candidate(&format!("node-{i}"), AlertStatus::Ready, AlertRunType::Normal),
                    0,
                )
                .await
        }));
    }

    let mut part_ids = BTreeSet::new();
    for h in handles {
        let record = h.await.unwrap().expect("unbounded check-in must succeed");
        assert_eq!(record.heartbeat, T0);
        assert!(part_ids.insert(record.part_id), "duplicate part id");
    }
    assert_eq!(part_ids, (0..8).collect::<BTreeSet<i32>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn admission_limit_one_elects_a_single_winner() {
    let store = Arc::new(MemStore::new(T0));
    let mut handles = Vec::new();
    for i in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .check_in(
                    &candidate(
                        &format!("node-{i}"),
                        AlertStatus::Scheduling,
                        AlertRunType::Cleanup,
                    ),
                    1,
                )
                .await
        }));
    }

    let mut wins = 0;
    let mut denials = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(record) => {
                assert_eq!(record.part_id, 0);
                wins += 1;
            }
            Err(StoreError::AdmissionLimitReached) => denials += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(denials, 4);
}

#[tokio::test]
async fn part_ids_are_scoped_by_status_not_shared_across() {
    let store = MemStore::new(T0);
    let ready = store
        .check_in(&candidate("a", AlertStatus::Ready, AlertRunType::Normal), 0)
        .await
        .unwrap();
    let scheduling = store
        .check_in(&candidate("a", AlertStatus::Scheduling, AlertRunType::Missing), 0)
        .await
        .unwrap();
    // Separate 0-based sequences per status.
    assert_eq!(ready.part_id, 0);
    assert_eq!(scheduling.part_id, 0);
}

#[tokio::test]
async fn heartbeat_is_minute_truncated_store_time() {
    let store = MemStore::new(T0 + 37);
    let record = store
        .check_in(&candidate("a", AlertStatus::Ready, AlertRunType::Normal), 0)
        .await
        .unwrap();
    assert_eq!(record.heartbeat, T0);
    assert_eq!(store.current_timestamp().await.unwrap(), T0);
    assert_eq!(store.last_interval().await.unwrap(), T0 - 60);
}

#[tokio::test]
async fn count_ready_ignores_other_statuses_and_heartbeats() {
    let store = MemStore::new(T0);
    for node in ["a", "b"] {
        store
            .check_in(&candidate(node, AlertStatus::Ready, AlertRunType::Normal), 0)
            .await
            .unwrap();
    }
    store
        .check_in(&candidate("c", AlertStatus::Processing, AlertRunType::Normal), 0)
        .await
        .unwrap();
    store.advance_secs(60);
    store
        .check_in(&candidate("d", AlertStatus::Ready, AlertRunType::Normal), 0)
        .await
        .unwrap();

    assert_eq!(store.count_ready(T0).await.unwrap(), 2);
    assert_eq!(store.count_ready(T0 + 60).await.unwrap(), 1);
}

#[tokio::test]
async fn find_cleanup_window_is_half_open() {
    let store = MemStore::new(T0);
    store
        .check_in(&candidate("a", AlertStatus::Scheduling, AlertRunType::Cleanup), 1)
        .await
        .unwrap();

    let hits = store.find_cleanup_window(T0 - 3600, T0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, "a");

    // `from` is exclusive.
    assert!(store.find_cleanup_window(T0, T0 + 3600).await.unwrap().is_empty());
}

#[tokio::test]
async fn purge_is_idempotent() {
    let retention = Retention {
        heartbeat_secs: 3600,
        annotation_secs: 7200,
    };
    let store = MemStore::new(T0);
    store.add_annotation(T0 - 10_000);
    store.add_annotation(T0 - 100);
    store
        .check_in(&candidate("a", AlertStatus::Ready, AlertRunType::Normal), 0)
        .await
        .unwrap();
    store.set_now(T0 + 7200);
    store
        .check_in(&candidate("a", AlertStatus::Ready, AlertRunType::Normal), 0)
        .await
        .unwrap();

    let last_heartbeat = T0 + 7200;
    let report = store.purge_older_than(last_heartbeat, retention).await.unwrap();
    assert_eq!(report.heartbeats_deleted, 1);
    assert_eq!(report.annotations_deleted, 1);

    // No new rows between calls: nothing left to delete.
    let report = store.purge_older_than(last_heartbeat, retention).await.unwrap();
    assert_eq!(report.heartbeats_deleted, 0);
    assert_eq!(report.annotations_deleted, 0);
    assert_eq!(store.heartbeats().len(), 1);
    assert_eq!(store.annotation_count(), 1);
}

#[tokio::test]
async fn find_missing_applies_delay_and_lookback() {
    let now = T0;
    let store = MemStore::new(now);
    // Evaluated this minute: not missed.
    store.add_rule(rule(4, 60, now));
    // Expected eval 15 min ago, delay window passed: missed.
    store.add_rule(rule(5, 900, now - 1800));
    // Expected eval 1 min ago, still inside the 10-minute delay: not missed.
    store.add_rule(rule(6, 60, now - 120));
    // Last eval beyond the lookback horizon: abandoned, not replayed.
    store.add_rule(rule(7, 10_800, now - 25_200));
    // Expected eval 5 min in the future relative to the delay: not missed.
    store.add_rule(rule(8, 600, now - 300));

    let missing = store.find_missing(600, 21_600).await.unwrap();
    let ids: Vec<i64> = missing.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![5]);
}

#[tokio::test]
async fn find_missing_skips_sub_minute_frequencies() {
    let store = MemStore::new(T0);
    store.add_rule(rule(1, 30, T0 - 3600));
    assert!(store.find_missing(600, 21_600).await.unwrap().is_empty());
}
