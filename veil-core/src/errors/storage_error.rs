//! Storage-layer errors for the admin, source, and destination databases.

use super::error_code::{self, VeilErrorCode};

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("database busy (another operation in progress)")]
    Busy,

    #[error("database corrupt: {details}")]
    Corrupt { details: String },

    #[error("migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("constraint violated: {message}")]
    Constraint { message: String },

    #[error("a different master research ID is already recorded for this patient")]
    MridMismatch,

    #[error("unknown source database tag {tag:?}")]
    UnknownSource { tag: String },
}

impl StorageError {
    /// Whether the error is worth retrying with backoff. Busy/locked states
    /// are transient; everything else is treated as persistent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Busy => true,
            Self::Sqlite { message } => {
                let m = message.to_ascii_lowercase();
                m.contains("locked") || m.contains("busy")
            }
            _ => false,
        }
    }
}

impl VeilErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Busy => error_code::DB_BUSY,
            Self::Corrupt { .. } => error_code::DB_CORRUPT,
            Self::MigrationFailed { .. } => error_code::MIGRATION_FAILED,
            Self::MridMismatch => error_code::MRID_MISMATCH,
            _ => error_code::STORAGE_ERROR,
        }
    }
}
