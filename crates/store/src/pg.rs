//! PostgreSQL implementation of the store traits, backed by sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info};

use takt_core::{AlertRule, AlertRunType, AlertStatus, HeartbeatRecord};

use crate::error::StoreError;
use crate::heartbeat::{
    retry_check_in, HeartbeatStore, PurgeReport, Retention, RuleStore,
};

/// Store time in unix seconds, rounded down to the minute. Always the
/// database clock: local wall clocks skew between nodes and would break
/// part-id uniqueness.
const CURRENT_MINUTE_SQL: &str =
    "SELECT (floor(extract(epoch FROM now()) / 60) * 60)::bigint AS ts";

/// Create a PostgreSQL connection pool and run migrations.
pub async fn init_pg_pool(config: &takt_core::config::PostgresConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPool::connect(&config.database_url()).await?;
    info!("PostgreSQL connected: {}", config.host);
    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied");
    Ok(pool)
}

// ── Row types ────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct HeartbeatRow {
    node_id: String,
    heartbeat: i64,
    part_id: i32,
    alert_run_type: String,
    alert_status: String,
}

impl TryFrom<HeartbeatRow> for HeartbeatRecord {
    type Error = StoreError;

    fn try_from(row: HeartbeatRow) -> Result<Self, Self::Error> {
        Ok(HeartbeatRecord {
            node_id: row.node_id,
            heartbeat: row.heartbeat,
            part_id: row.part_id,
            run_type: AlertRunType::from_str(&row.alert_run_type)?,
            status: AlertStatus::from_str(&row.alert_status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    name: String,
    frequency_secs: i64,
    last_eval: DateTime<Utc>,
}

impl From<RuleRow> for AlertRule {
    fn from(row: RuleRow) -> Self {
        AlertRule {
            id: row.id,
            name: row.name,
            frequency_secs: row.frequency_secs,
            last_eval: row.last_eval,
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Shared-store access over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One check-in transaction: resolve store time, compute the next
    /// part id, enforce the admission limit, insert.
    ///
    /// Two nodes racing under read-committed isolation can compute the same
    /// part id; the unique index on `(heartbeat, part_id, alert_run_type)`
    /// then fails the second insert, which surfaces as a transient error and
    /// is retried with a fresh count.
    ///
    /// The index only catches same-run-type races. Concurrent limit-1
    /// elections with different run types (MISSING and CLEANUP can coincide
    /// at minute 0 of a cleanup hour) may each admit a winner; READY
    /// partitioning is unaffected since READY rows are always NORMAL.
    async fn try_check_in(
        &self,
        candidate: &HeartbeatRecord,
        admission_limit: i32,
    ) -> Result<HeartbeatRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let ts: i64 = sqlx::query_scalar(CURRENT_MINUTE_SQL)
            .fetch_one(&mut *tx)
            .await?;

        let part_id: i64 = sqlx::query_scalar(
            "SELECT count(part_id) FROM active_node WHERE heartbeat = $1 AND alert_status = $2",
        )
        .bind(ts)
        .bind(candidate.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if admission_limit > 0 && part_id >= admission_limit as i64 {
            return Err(StoreError::AdmissionLimitReached);
        }

        sqlx::query(
            "INSERT INTO active_node (node_id, heartbeat, part_id, alert_run_type, alert_status)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&candidate.node_id)
        .bind(ts)
        .bind(part_id as i32)
        .bind(candidate.run_type.as_str())
        .bind(candidate.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(node_id = %candidate.node_id, heartbeat = ts, part_id, "heartbeat inserted");

        Ok(HeartbeatRecord {
            node_id: candidate.node_id.clone(),
            heartbeat: ts,
            part_id: part_id as i32,
            run_type: candidate.run_type,
            status: candidate.status,
        })
    }
}

#[async_trait]
impl HeartbeatStore for PgStore {
    async fn check_in(
        &self,
        candidate: &HeartbeatRecord,
        admission_limit: i32,
    ) -> Result<HeartbeatRecord, StoreError> {
        retry_check_in(|| {
            let store = self.clone();
            let candidate = candidate.clone();
            async move { store.try_check_in(&candidate, admission_limit).await }
        })
        .await
    }

    async fn count_ready(&self, heartbeat: i64) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM active_node WHERE heartbeat = $1 AND alert_status = $2",
        )
        .bind(heartbeat)
        .bind(AlertStatus::Ready.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn find_by_node_and_heartbeat(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> Result<Option<HeartbeatRecord>, StoreError> {
        let row = sqlx::query_as::<_, HeartbeatRow>(
            "SELECT node_id, heartbeat, part_id, alert_run_type, alert_status
             FROM active_node WHERE node_id = $1 AND heartbeat = $2",
        )
        .bind(node_id)
        .bind(heartbeat)
        .fetch_optional(&self.pool)
        .await?;
        row.map(HeartbeatRecord::try_from).transpose()
    }

    async fn find_cleanup_window(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<HeartbeatRecord>, StoreError> {
        let rows = sqlx::query_as::<_, HeartbeatRow>(
            "SELECT node_id, heartbeat, part_id, alert_run_type, alert_status
             FROM active_node
             WHERE heartbeat > $1 AND heartbeat <= $2 AND alert_run_type = $3",
        )
        .bind(from)
        .bind(to)
        .bind(AlertRunType::Cleanup.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HeartbeatRecord::try_from).collect()
    }

    async fn purge_older_than(
        &self,
        last_heartbeat: i64,
        retention: Retention,
    ) -> Result<PurgeReport, StoreError> {
        let mut report = PurgeReport::default();
        let mut first_error: Option<StoreError> = None;

        match purge_heartbeats(&self.pool, last_heartbeat - retention.heartbeat_secs).await {
            Ok(n) => {
                info!(rows_deleted = n, "'active_node' table cleanup done");
                report.heartbeats_deleted = n;
            }
            Err(e) => {
                error!(error = %e, "heartbeat cleanup failed");
                first_error = Some(e);
            }
        }

        match purge_annotations(&self.pool, last_heartbeat - retention.annotation_secs).await {
            Ok(n) => {
                info!(rows_deleted = n, "'annotation' table cleanup done");
                report.annotations_deleted = n;
            }
            Err(e) => {
                error!(error = %e, "annotation cleanup failed");
                first_error = first_error.or(Some(e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn current_timestamp(&self) -> Result<i64, StoreError> {
        let ts: i64 = sqlx::query_scalar(CURRENT_MINUTE_SQL)
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }
}

async fn purge_heartbeats(pool: &PgPool, cutoff: i64) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query("DELETE FROM active_node WHERE heartbeat < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

async fn purge_annotations(pool: &PgPool, cutoff: i64) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query("DELETE FROM annotation WHERE epoch < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl RuleStore for PgStore {
    async fn fetch_all(&self) -> Result<Vec<AlertRule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, name, frequency_secs, last_eval
             FROM alert_rule WHERE enabled ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AlertRule::from).collect())
    }

    async fn find_missing(
        &self,
        delay_secs: i64,
        lookback_secs: i64,
    ) -> Result<Vec<AlertRule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, name, frequency_secs, last_eval
             FROM alert_rule
             WHERE enabled
               AND frequency_secs >= 60
               AND extract(epoch FROM last_eval) + frequency_secs + $1
                   <= extract(epoch FROM now())
               AND last_eval >= now() - ($2 * interval '1 second')
             ORDER BY id",
        )
        .bind(delay_secs)
        .bind(lookback_secs)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AlertRule::from).collect())
    }
}
