use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Store error: {0}")]
    Store(#[from] takt_store::StoreError),

    #[error("Scheduling error: {0}")]
    Schedule(#[from] takt_scheduling::ScheduleError),

    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),

    /// The peer loop went away without a shutdown signal.
    #[error("Coordination channel closed")]
    ChannelClosed,
}
