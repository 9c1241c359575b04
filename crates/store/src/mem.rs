//! In-memory store used by tests and the simulated-cluster harness.
//!
//! A single mutex around the tables plays the role of transaction isolation:
//! every check-in observes a consistent count before inserting, which is what
//! the gapless part-id guarantee requires.

use std::sync::Mutex;

use async_trait::async_trait;

use takt_core::model::truncate_to_minute;
use takt_core::{AlertRule, AlertStatus, HeartbeatRecord};

use crate::error::StoreError;
use crate::heartbeat::{HeartbeatStore, PurgeReport, Retention, RuleStore};

#[derive(Default)]
struct MemInner {
    /// Logical store clock, unix seconds. Tests advance it explicitly.
    now: i64,
    heartbeats: Vec<HeartbeatRecord>,
    rules: Vec<AlertRule>,
    /// Annotation rows, reduced to their epoch column.
    annotations: Vec<i64>,
}

/// Mutex-guarded in-memory implementation of [`HeartbeatStore`] and
/// [`RuleStore`].
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new(now: i64) -> Self {
        Self {
            inner: Mutex::new(MemInner {
                now,
                ..MemInner::default()
            }),
        }
    }

    /// Set the logical store clock.
    pub fn set_now(&self, now: i64) {
        self.inner.lock().unwrap().now = now;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.inner.lock().unwrap().now += secs;
    }

    pub fn add_rule(&self, rule: AlertRule) {
        self.inner.lock().unwrap().rules.push(rule);
    }

    pub fn add_annotation(&self, epoch: i64) {
        self.inner.lock().unwrap().annotations.push(epoch);
    }

    /// Snapshot of all heartbeat rows, in insertion order.
    pub fn heartbeats(&self) -> Vec<HeartbeatRecord> {
        self.inner.lock().unwrap().heartbeats.clone()
    }

    pub fn annotation_count(&self) -> usize {
        self.inner.lock().unwrap().annotations.len()
    }
}

#[async_trait]
impl HeartbeatStore for MemStore {
    async fn check_in(
        &self,
        candidate: &HeartbeatRecord,
        admission_limit: i32,
    ) -> Result<HeartbeatRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let ts = truncate_to_minute(inner.now);
        let part_id = inner
            .heartbeats
            .iter()
            .filter(|h| h.heartbeat == ts && h.status == candidate.status)
            .count() as i32;

        if admission_limit > 0 && part_id >= admission_limit {
            return Err(StoreError::AdmissionLimitReached);
        }

        let record = HeartbeatRecord {
            node_id: candidate.node_id.clone(),
            heartbeat: ts,
            part_id,
            run_type: candidate.run_type,
            status: candidate.status,
        };
        inner.heartbeats.push(record.clone());
        Ok(record)
    }

    async fn count_ready(&self, heartbeat: i64) -> Result<usize, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .heartbeats
            .iter()
            .filter(|h| h.heartbeat == heartbeat && h.status == AlertStatus::Ready)
            .count())
    }

    async fn find_by_node_and_heartbeat(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> Result<Option<HeartbeatRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .heartbeats
            .iter()
            .find(|h| h.node_id == node_id && h.heartbeat == heartbeat)
            .cloned())
    }

    async fn find_cleanup_window(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<HeartbeatRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .heartbeats
            .iter()
            .filter(|h| {
                h.heartbeat > from
                    && h.heartbeat <= to
                    && h.run_type == takt_core::AlertRunType::Cleanup
            })
            .cloned()
            .collect())
    }

    async fn purge_older_than(
        &self,
        last_heartbeat: i64,
        retention: Retention,
    ) -> Result<PurgeReport, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let hb_cutoff = last_heartbeat - retention.heartbeat_secs;
        let before = inner.heartbeats.len();
        inner.heartbeats.retain(|h| h.heartbeat >= hb_cutoff);
        let heartbeats_deleted = (before - inner.heartbeats.len()) as u64;

        let anno_cutoff = last_heartbeat - retention.annotation_secs;
        let before = inner.annotations.len();
        inner.annotations.retain(|epoch| *epoch >= anno_cutoff);
        let annotations_deleted = (before - inner.annotations.len()) as u64;

        Ok(PurgeReport {
            heartbeats_deleted,
            annotations_deleted,
        })
    }

    async fn current_timestamp(&self) -> Result<i64, StoreError> {
        Ok(truncate_to_minute(self.inner.lock().unwrap().now))
    }
}

#[async_trait]
impl RuleStore for MemStore {
    async fn fetch_all(&self) -> Result<Vec<AlertRule>, StoreError> {
        Ok(self.inner.lock().unwrap().rules.clone())
    }

    async fn find_missing(
        &self,
        delay_secs: i64,
        lookback_secs: i64,
    ) -> Result<Vec<AlertRule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let now = inner.now;
        Ok(inner
            .rules
            .iter()
            .filter(|r| {
                let last_eval = r.last_eval.timestamp();
                r.frequency_secs >= 60
                    && last_eval + r.frequency_secs + delay_secs <= now
                    && last_eval >= now - lookback_secs
            })
            .cloned()
            .collect())
    }
}
