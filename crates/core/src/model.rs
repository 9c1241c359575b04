//! Core model types for cluster coordination.
//!
//! The persisted [`HeartbeatRecord`] is the only state shared between nodes;
//! [`AlertingState`] is each node's private, in-memory view of itself.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaktError;

// ── Status / run type enums ──────────────────────────────────────────

/// Where a node currently is in its per-minute scheduling cycle.
///
/// Stored as text in the `active_node` table; an unknown string on the way
/// back out of the database is a decode error, not a tolerated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Off,
    Ready,
    Scheduling,
    Processing,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Off => "OFF",
            AlertStatus::Ready => "READY",
            AlertStatus::Scheduling => "SCHEDULING",
            AlertStatus::Processing => "PROCESSING",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = TaktError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFF" => Ok(AlertStatus::Off),
            "READY" => Ok(AlertStatus::Ready),
            "SCHEDULING" => Ok(AlertStatus::Scheduling),
            "PROCESSING" => Ok(AlertStatus::Processing),
            other => Err(TaktError::InvalidAlertStatus(other.to_string())),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a node is currently scheduling: its regular shard, missed-alert
/// catch-up, or the once-per-period cleanup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertRunType {
    Normal,
    Missing,
    Cleanup,
}

impl AlertRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertRunType::Normal => "NORMAL",
            AlertRunType::Missing => "MISSING",
            AlertRunType::Cleanup => "CLEANUP",
        }
    }
}

impl FromStr for AlertRunType {
    type Err = TaktError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(AlertRunType::Normal),
            "MISSING" => Ok(AlertRunType::Missing),
            "CLEANUP" => Ok(AlertRunType::Cleanup),
            other => Err(TaktError::InvalidRunType(other.to_string())),
        }
    }
}

impl fmt::Display for AlertRunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Heartbeat record ─────────────────────────────────────────────────

/// One check-in row in the `active_node` table. Append-only: a new tick
/// always inserts a new row, never updates an existing one.
///
/// For a fixed `(heartbeat, status)` pair, `part_id` values form a gapless
/// 0-based sequence in insertion order — that ordinal is a node's shard key
/// for the interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub node_id: String,
    /// Unix seconds, truncated to the minute, always store-derived.
    pub heartbeat: i64,
    pub part_id: i32,
    pub run_type: AlertRunType,
    pub status: AlertStatus,
}

// ── Per-node in-memory state ─────────────────────────────────────────

/// A node's private view of its own scheduling cycle.
///
/// Owned and mutated exclusively by the coordinator's decision loop. The
/// persisted [`HeartbeatRecord`] is a snapshot of this, not the other way
/// around.
#[derive(Debug, Clone)]
pub struct AlertingState {
    pub status: AlertStatus,
    pub run_type: AlertRunType,
    pub last_processed_interval: i64,
}

impl AlertingState {
    pub fn new() -> Self {
        Self {
            status: AlertStatus::Off,
            run_type: AlertRunType::Normal,
            last_processed_interval: 0,
        }
    }
}

impl Default for AlertingState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Alert rules and jobs ─────────────────────────────────────────────

/// An alert-rule definition as the coordinator sees it. The evaluation
/// engine owns the full rule model; scheduling only needs identity, cadence
/// and the last evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    /// Evaluation cadence in seconds.
    pub frequency_secs: i64,
    /// When this rule was last evaluated.
    pub last_eval: DateTime<Utc>,
}

/// A scheduled request to evaluate one rule, handed to the evaluation
/// engine's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalJob {
    pub rule: AlertRule,
    /// `0` for a regular evaluation. A positive value marks a synthetic
    /// catch-up evaluation at `now - offset_factor * frequency`.
    pub offset_factor: i64,
}

impl EvalJob {
    pub fn regular(rule: AlertRule) -> Self {
        Self {
            rule,
            offset_factor: 0,
        }
    }

    pub fn catch_up(rule: AlertRule, offset_factor: i64) -> Self {
        Self {
            rule,
            offset_factor,
        }
    }
}

// ── Time helpers ─────────────────────────────────────────────────────

/// Truncate a unix-seconds timestamp down to the start of its minute.
pub fn truncate_to_minute(ts: i64) -> i64 {
    ts - ts.rem_euclid(60)
}
