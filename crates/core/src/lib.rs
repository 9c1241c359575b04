//! Shared model types and configuration for the taktgeber cluster.

pub mod config;
pub mod error;
pub mod model;

pub use config::Config;
pub use error::TaktError;
pub use model::{
    AlertRule, AlertRunType, AlertStatus, AlertingState, EvalJob, HeartbeatRecord,
};
