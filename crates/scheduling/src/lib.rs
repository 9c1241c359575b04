//! Alert scheduling operations.
//!
//! Stateless functions that turn heartbeat-derived facts (a partition
//! assignment, a set of missed rules) into the exact job set to hand the
//! evaluation engine. All the cluster-awareness lives in the caller; these
//! functions only decide which rules become jobs.

pub mod missed;
pub mod partition;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Node count is 0")]
    NodeCountZero,

    #[error("Invalid partition id {part_id} (node count = {node_count})")]
    InvalidPartition { part_id: i32, node_count: usize },
}

pub use missed::schedule_missed_rules;
pub use partition::partition_rules;
