//! Transient messages between the decision loop and the dispatch loop.
//!
//! A [`DispatchTask`] lives for one tick: the decision loop creates it, the
//! dispatch loop consumes it and answers with exactly one [`DispatchStatus`].

use takt_core::AlertRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    PartitionAlerts,
    MissingAlerts,
    Cleanup,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::PartitionAlerts => "partition-alerts",
            TaskKind::MissingAlerts => "missing-alerts",
            TaskKind::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum DispatchTask {
    /// Schedule this node's shard of the regular per-minute evaluations.
    PartitionAlerts {
        part_id: i32,
        node_count: usize,
        interval: i64,
    },
    /// Replay catch-up evaluations for rules that were missed.
    MissingAlerts(Vec<AlertRule>),
    /// Purge heartbeat and annotation rows past retention.
    Cleanup { last_heartbeat: i64 },
}

impl DispatchTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            DispatchTask::PartitionAlerts { .. } => TaskKind::PartitionAlerts,
            DispatchTask::MissingAlerts(_) => TaskKind::MissingAlerts,
            DispatchTask::Cleanup { .. } => TaskKind::Cleanup,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchStatus {
    pub kind: TaskKind,
    pub success: bool,
    pub errmsg: String,
}

impl DispatchStatus {
    pub fn ok(kind: TaskKind) -> Self {
        Self {
            kind,
            success: true,
            errmsg: String::new(),
        }
    }

    pub fn failed(kind: TaskKind, errmsg: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            errmsg: errmsg.into(),
        }
    }
}
