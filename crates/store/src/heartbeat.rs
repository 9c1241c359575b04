//! Store traits: heartbeat check-ins and alert-rule queries.

use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, error};

use takt_core::{AlertRule, HeartbeatRecord};

use crate::error::StoreError;

/// How many check-in attempts are made before a transient database error is
/// surfaced to the caller.
pub const CHECK_IN_RETRIES: u32 = 3;

/// Drive one check-in attempt up to [`CHECK_IN_RETRIES`] times.
///
/// Only transient errors are retried; [`StoreError::AdmissionLimitReached`]
/// is an election outcome and is returned on the first attempt.
pub(crate) async fn retry_check_in<T, F, Fut>(mut attempt_fn: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < CHECK_IN_RETRIES => {
                debug!(error = %e, attempt, "check-in tx failed, retrying");
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    error!(error = %e, attempt, "check-in failed on final attempt");
                }
                return Err(e);
            }
        }
    }
}

/// Retention thresholds applied by [`HeartbeatStore::purge_older_than`],
/// in seconds relative to the last heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    pub heartbeat_secs: i64,
    pub annotation_secs: i64,
}

/// Rows deleted by one cleanup pass, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub heartbeats_deleted: u64,
    pub annotations_deleted: u64,
}

/// The coordination side of the shared store.
///
/// `check_in` is the sole correctness-bearing operation: under transaction
/// isolation it guarantees that, for any `(heartbeat, status)` pair, at most
/// `admission_limit` rows exist (unbounded when 0) and that assigned
/// `part_id`s are a gapless 0-based sequence. Everything else in the cluster
/// builds on that property.
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Insert a check-in row for `candidate` within one transaction.
    ///
    /// The heartbeat timestamp is resolved from the store clock (never the
    /// local clock) truncated to the minute, and `part_id` is computed as the
    /// count of existing rows for `(heartbeat, candidate.status)`. When
    /// `admission_limit > 0` and that count already equals the limit, fails
    /// with [`StoreError::AdmissionLimitReached`].
    ///
    /// Transient database errors are retried up to [`CHECK_IN_RETRIES`] times
    /// before surfacing; admission denial is never retried. Returns the
    /// inserted record with its resolved heartbeat and part id.
    async fn check_in(
        &self,
        candidate: &HeartbeatRecord,
        admission_limit: i32,
    ) -> Result<HeartbeatRecord, StoreError>;

    /// Number of nodes checked in as READY for `heartbeat` — the live node
    /// count used to partition rules.
    async fn count_ready(&self, heartbeat: i64) -> Result<usize, StoreError>;

    /// Look up one node's check-in row for a given heartbeat.
    async fn find_by_node_and_heartbeat(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> Result<Option<HeartbeatRecord>, StoreError>;

    /// CLEANUP check-ins with heartbeat in `(from, to]`; non-empty means
    /// cleanup already ran this period.
    async fn find_cleanup_window(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<HeartbeatRecord>, StoreError>;

    /// Delete heartbeat and annotation rows older than their retention
    /// thresholds, each in its own transaction. A failure on one table does
    /// not prevent the attempt on the other; the first error encountered is
    /// the one surfaced.
    async fn purge_older_than(
        &self,
        last_heartbeat: i64,
        retention: Retention,
    ) -> Result<PurgeReport, StoreError>;

    /// Current store time in unix seconds, rounded down to the minute.
    async fn current_timestamp(&self) -> Result<i64, StoreError>;

    /// The most recently completed minute interval — what nodes actually
    /// schedule for.
    async fn last_interval(&self) -> Result<i64, StoreError> {
        Ok(self.current_timestamp().await? - 60)
    }
}

/// Read side for alert-rule definitions. The rules themselves belong to the
/// evaluation engine; the coordinator only needs identity, cadence and last
/// evaluation time.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All enabled alert rules.
    async fn fetch_all(&self) -> Result<Vec<AlertRule>, StoreError>;

    /// Rules whose expected evaluation (`last_eval + frequency`) is more than
    /// `delay_secs` in the past but still within `lookback_secs`. Rules with
    /// a sub-minute frequency are never reported as missed.
    async fn find_missing(
        &self,
        delay_secs: i64,
        lookback_secs: i64,
    ) -> Result<Vec<AlertRule>, StoreError>;
}
