//! Shared-store coordination primitives.
//!
//! The `active_node` heartbeat table is the only state shared between nodes
//! and the only mutual-exclusion mechanism in the cluster: check-ins are
//! append-only rows whose insertion ordinal doubles as a shard key, and an
//! admission limit of 1 turns a check-in into a single-winner election.

pub mod error;
pub mod heartbeat;
pub mod mem;
pub mod pg;

pub use error::StoreError;
pub use heartbeat::{HeartbeatStore, PurgeReport, Retention, RuleStore, CHECK_IN_RETRIES};
pub use mem::MemStore;
pub use pg::{init_pg_pool, PgStore};
