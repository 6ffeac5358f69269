//! Scrubber construction errors.

use super::error_code::{self, VeilErrorCode};

/// Errors raised while building or compiling scrubbers.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("cannot read word list {path}: {message}")]
    WordList { path: String, message: String },

    #[error("alter method references hasher {tag:?}, which is not configured")]
    UnknownHasher { tag: String },
}

impl VeilErrorCode for ScrubError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Pattern { .. } | Self::UnknownHasher { .. } => error_code::PATTERN_INVALID,
            Self::WordList { .. } => error_code::WORDLIST_UNREADABLE,
        }
    }
}
