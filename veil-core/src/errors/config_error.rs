//! Configuration and data-dictionary load errors. All fatal at startup.

use super::error_code::{self, VeilErrorCode};

/// Errors raised while loading configuration or the data dictionary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("config parse error: {message}")]
    Parse { message: String },

    #[error("invalid option {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("unknown {cell} token: {token:?}")]
    UnknownToken { cell: String, token: String },

    #[error("data dictionary line {line}: {message}")]
    Dictionary { line: usize, message: String },

    #[error("data dictionary is missing header column {header:?}")]
    MissingHeader { header: String },

    #[error("data dictionary invariant violated: {message}")]
    Invariant { message: String },

    #[error("hasher {purpose:?} has no key configured")]
    HasherKeyMissing { purpose: String },

    #[error("date replacement directive {directive:?} is not permitted (allowed: %b %B %m %Y %y)")]
    BadDateDirective { directive: String },
}

impl ConfigError {
    /// Attach a dictionary line number to a token error.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::UnknownToken { cell, token } => Self::Dictionary {
                line,
                message: format!("unknown {cell} token {token:?}"),
            },
            other => other,
        }
    }
}

impl VeilErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Dictionary { .. } | Self::MissingHeader { .. } | Self::Invariant { .. } => {
                error_code::DICTIONARY_INVALID
            }
            Self::HasherKeyMissing { .. } => error_code::HASH_KEY_MISSING,
            _ => error_code::CONFIG_ERROR,
        }
    }
}
