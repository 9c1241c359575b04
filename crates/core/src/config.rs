use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            cluster: ClusterConfig::from_env(),
            postgres: PostgresConfig::from_env(),
        }
    }
}

// ── Cluster coordination settings ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identifies this node in `active_node` check-ins. Must be unique per
    /// process; defaults to a random per-process id.
    pub node_id: String,
    /// Master switch for alert evaluation.
    pub alerting_enabled: bool,
    /// Whether this node executes alerts (vs. only serving them).
    pub execute_alerts: bool,
    /// Whether clustered coordination is active at all.
    pub clustering_enabled: bool,
    /// Cleanup runs when `hour % cleanup_period_hours == 0` at 00:00 of the hour.
    pub cleanup_period_hours: u32,
    /// Missed-alert recovery runs when `minute % missing_check_interval_mins == 0`.
    pub missing_check_interval_mins: u32,
    /// A rule counts as missed once its expected evaluation is this many
    /// seconds in the past.
    pub missing_delay_secs: i64,
    /// Misses older than this are abandoned rather than replayed.
    pub missing_lookback_secs: i64,
    /// Heartbeat rows older than `last_heartbeat - this` are purged.
    pub heartbeat_retention_secs: i64,
    /// Annotation rows older than `last_heartbeat - this` are purged.
    pub annotation_retention_secs: i64,
}

impl ClusterConfig {
    pub fn from_env() -> Self {
        Self {
            node_id: env_or("TAKT_NODE_ID", &default_node_id()),
            alerting_enabled: env_bool("TAKT_ALERTING_ENABLED", true),
            execute_alerts: env_bool("TAKT_EXECUTE_ALERTS", true),
            clustering_enabled: env_bool("TAKT_CLUSTERING_ENABLED", true),
            cleanup_period_hours: env_u32("TAKT_CLEANUP_PERIOD_HOURS", 24).max(1),
            missing_check_interval_mins: env_u32("TAKT_MISSING_INTERVAL_MINS", 10).max(1),
            missing_delay_secs: env_i64("TAKT_MISSING_DELAY_SECS", 600),
            missing_lookback_secs: env_i64("TAKT_MISSING_LOOKBACK_SECS", 21_600),
            heartbeat_retention_secs: env_i64("TAKT_HEARTBEAT_RETENTION_SECS", 86_400),
            annotation_retention_secs: env_i64("TAKT_ANNOTATION_RETENTION_SECS", 2_592_000),
        }
    }
}

fn default_node_id() -> String {
    format!("node-{}", uuid::Uuid::new_v4().as_simple())
}

// ── PostgreSQL connection ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u32,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Full connection URL; overrides the individual fields when set.
    pub url: String,
}

impl PostgresConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("PG_HOST", "localhost"),
            port: env_u32("PG_PORT", 5432),
            user: env_or("PG_USER", "takt"),
            password: env_or("PG_PASSWORD", ""),
            database: env_or("PG_DATABASE", "takt"),
            url: env_or("PG_URL", ""),
        }
    }

    pub fn database_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}
