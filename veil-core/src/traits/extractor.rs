//! The external text-extraction collaborator.
//!
//! Conversion of binary document formats to text happens outside the core;
//! this trait is the seam. A timeout expiry is an extraction failure and is
//! handled per the column's alter methods.

use std::path::Path;
use std::time::Duration;

use crate::errors::ExtractError;

/// What to extract from.
#[derive(Debug)]
pub enum ExtractSource<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

/// Converts a document to plain text. `Ok(None)` means the document was
/// readable but contained no text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(
        &self,
        source: ExtractSource<'_>,
        ext: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ExtractError>;
}

/// Pass-through extractor for plain-text formats. Useful as a default and in
/// tests; anything that is not valid UTF-8 fails.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(
        &self,
        source: ExtractSource<'_>,
        _ext: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, ExtractError> {
        let bytes = match source {
            ExtractSource::Bytes(b) => b.to_vec(),
            ExtractSource::Path(p) => std::fs::read(p).map_err(|e| ExtractError::Failed {
                message: format!("{}: {e}", p.display()),
            })?,
        };
        let text = String::from_utf8(bytes).map_err(|_| ExtractError::Failed {
            message: "document is not valid UTF-8".to_string(),
        })?;
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}
