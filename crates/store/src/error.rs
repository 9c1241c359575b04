use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The admission limit for this `(heartbeat, status)` pair was already
    /// reached — another node won the election. Expected, not retried.
    #[error("Admission limit reached")]
    AdmissionLimitReached,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] takt_core::TaktError),
}

impl StoreError {
    /// Whether a failed check-in transaction is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}
