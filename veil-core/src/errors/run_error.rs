//! Top-level run errors and the process exit-code mapping.

use super::config_error::ConfigError;
use super::error_code::{self, VeilErrorCode};
use super::scrub_error::ScrubError;
use super::storage_error::StorageError;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Scrub(#[from] ScrubError),

    #[error("run cancelled")]
    Cancelled,

    #[error("worker failed: {message}")]
    Worker { message: String },
}

impl RunError {
    /// Process exit code for this failure. Success is 0, by the caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Storage(_) => 3,
            Self::Scrub(_) => 4,
            Self::Worker { .. } => 5,
            Self::Cancelled => 130,
        }
    }
}

impl VeilErrorCode for RunError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Scrub(e) => e.error_code(),
            Self::Cancelled => error_code::RUN_CANCELLED,
            Self::Worker { .. } => error_code::WORKER_FAILED,
        }
    }
}
