//! Text-extraction errors. Localised to a single row: the cell becomes null,
//! or the row is dropped when `SkipIfExtractFails` is set.

use super::error_code::{self, VeilErrorCode};

/// A single document could not be converted to text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction failed: {message}")]
    Failed { message: String },

    #[error("extraction timed out")]
    Timeout,
}

impl VeilErrorCode for ExtractError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Failed { .. } => error_code::EXTRACTION_FAILED,
            Self::Timeout => error_code::EXTRACTION_TIMEOUT,
        }
    }
}
