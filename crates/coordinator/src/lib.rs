//! Per-node cluster coordination.
//!
//! Each node runs one [`ClusterCoordinator`]: a decision loop that ticks every
//! second and a dispatch loop that executes at most one task at a time. The
//! two are connected by capacity-1 queues, and everything a node knows about
//! its peers comes from heartbeat check-ins in the shared store.

pub mod clock;
pub mod engine;
pub mod error;
pub mod manager;
pub mod task;

pub use clock::{CoordClock, ManualClock, SystemClock};
pub use engine::{AlertEngine, EngineError, JobQueue};
pub use error::CoordinatorError;
pub use manager::ClusterCoordinator;
pub use task::{DispatchStatus, DispatchTask, TaskKind};
