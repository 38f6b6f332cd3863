//! Error types shared by every winbox module.

use thiserror::Error;

/// Errors produced by container management and the execution environment.
///
/// Variants follow the failure classes of the runtime:
/// configuration (bad persisted data), storage (provisioning), process
/// (spawn failures) and state/lookup errors.
#[derive(Error, Debug)]
pub enum WinboxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type WinboxResult<T> = std::result::Result<T, WinboxError>;
