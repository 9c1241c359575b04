use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaktError {
    #[error("Invalid alert status: {0}")]
    InvalidAlertStatus(String),

    #[error("Invalid alert run type: {0}")]
    InvalidRunType(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
