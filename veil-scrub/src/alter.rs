//! The per-column alter pipeline.
//!
//! Methods compose in a fixed order regardless of how the dictionary lists
//! them: text extraction, HTML unescape, HTML untag, date truncation,
//! hashing, scrubbing. Inclusion/exclusion filters are the caller's job and
//! act on the raw value *before* this pipeline.

use std::path::Path;
use std::time::Duration;

use veil_core::dd::ColumnSpec;
use veil_core::errors::ScrubError;
use veil_core::hashing::HasherSet;
use veil_core::traits::extractor::{ExtractSource, TextExtractor};
use veil_core::types::column::AlterMethod;
use veil_core::Value;

use crate::dates::parse_source_date;
use crate::html;
use crate::scrubber::Scrubber;

/// Shared inputs for the pipeline, owned by the worker.
pub struct AlterContext<'a> {
    pub scrubber: &'a Scrubber,
    pub hashers: &'a HasherSet,
    pub extractor: &'a dyn TextExtractor,
    pub extract_timeout: Duration,
}

/// Pipeline outcome for one cell.
#[derive(Debug, PartialEq)]
pub struct AlterResult {
    /// The transformed cell; `None` means the whole row is dropped
    /// (`SkipIfExtractFails` after a failed extraction).
    pub cell: Option<Value>,
    /// Whether a text extraction failed on this cell.
    pub extract_failed: bool,
}

impl AlterResult {
    fn cell(value: Value) -> Self {
        Self {
            cell: Some(value),
            extract_failed: false,
        }
    }
}

/// Apply a column's alter methods to one raw cell. `row_value` resolves
/// sibling columns by source field name (extension columns, filename
/// templates).
pub fn apply_alter_pipeline(
    spec: &ColumnSpec,
    raw: &Value,
    row_value: &dyn Fn(&str) -> Option<Value>,
    ctx: &AlterContext<'_>,
) -> Result<AlterResult, ScrubError> {
    if spec.alter.is_empty() {
        return Ok(AlterResult::cell(raw.clone()));
    }

    let mut extract_failed = false;
    let mut value = raw.clone();

    // 1. Text extraction (at most one extraction method is honoured).
    if let Some(method) = spec.alter.iter().find(|m| m.is_extraction()) {
        match extract(method, &value, row_value, ctx) {
            Ok(extracted) => {
                value = match extracted {
                    Some(text) => Value::Text(text),
                    None => Value::Null,
                };
            }
            Err(e) => {
                extract_failed = true;
                if spec.alter.contains(&AlterMethod::SkipIfExtractFails) {
                    tracing::warn!(column = %spec.locator(), error = %e, "extraction failed; row dropped");
                    return Ok(AlterResult {
                        cell: None,
                        extract_failed: true,
                    });
                }
                tracing::warn!(column = %spec.locator(), error = %e, "extraction failed; cell nulled");
                value = Value::Null;
            }
        }
    }

    // 2. HTML cleanup, unescape before untag.
    if spec.alter.contains(&AlterMethod::HtmlUnescape) {
        if let Some(text) = value.as_text() {
            value = Value::Text(html::unescape(&text));
        }
    }
    if spec.alter.contains(&AlterMethod::HtmlUntag) {
        if let Some(text) = value.as_text() {
            value = Value::Text(html::untag(&text));
        }
    }

    // 3. Date truncation: keep year and month, day becomes 1.
    if spec.alter.contains(&AlterMethod::TruncateDate) {
        value = match value.as_text().as_deref().and_then(parse_source_date) {
            Some(date) => Value::Text(date.format("%Y-%m-01").to_string()),
            None => {
                if !value.is_null() {
                    tracing::warn!(column = %spec.locator(), "unparseable date; cell nulled");
                }
                Value::Null
            }
        };
    }

    // 4. Hashing via a named extra hasher.
    if let Some(AlterMethod::Hash { hasher_tag }) = spec
        .alter
        .iter()
        .find(|m| matches!(m, AlterMethod::Hash { .. }))
    {
        if let Some(text) = value.as_text() {
            let hasher = ctx
                .hashers
                .extra(hasher_tag)
                .ok_or_else(|| ScrubError::UnknownHasher {
                    tag: hasher_tag.clone(),
                })?;
            value = Value::Text(hasher.hash(&text));
        }
    }

    // 5. Scrubbing, last.
    if spec.alter.contains(&AlterMethod::Scrub) {
        if let Some(text) = value.as_text() {
            value = Value::Text(ctx.scrubber.scrub(&text));
        }
    }

    Ok(AlterResult {
        cell: Some(value),
        extract_failed,
    })
}

fn extract(
    method: &AlterMethod,
    value: &Value,
    row_value: &dyn Fn(&str) -> Option<Value>,
    ctx: &AlterContext<'_>,
) -> Result<Option<String>, veil_core::errors::ExtractError> {
    use veil_core::errors::ExtractError;

    match method {
        AlterMethod::BinaryToText { extension_column } => {
            let ext = row_value(extension_column)
                .and_then(|v| v.as_text())
                .unwrap_or_default();
            match value {
                Value::Blob(bytes) => ctx.extractor.extract_text(
                    ExtractSource::Bytes(bytes),
                    &ext,
                    ctx.extract_timeout,
                ),
                Value::Null => Ok(None),
                other => match other.as_text() {
                    Some(text) => ctx.extractor.extract_text(
                        ExtractSource::Bytes(text.as_bytes()),
                        &ext,
                        ctx.extract_timeout,
                    ),
                    None => Err(ExtractError::Failed {
                        message: "cell is neither blob nor text".to_string(),
                    }),
                },
            }
        }
        AlterMethod::FilenameToText => match value.as_text() {
            Some(path) => {
                let ext = Path::new(&path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string();
                ctx.extractor
                    .extract_text(ExtractSource::Path(Path::new(&path)), &ext, ctx.extract_timeout)
            }
            None => Ok(None),
        },
        AlterMethod::FilenameFormatToText { template } => {
            let path = expand_template(template, row_value)?;
            let ext = Path::new(&path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            ctx.extractor
                .extract_text(ExtractSource::Path(Path::new(&path)), &ext, ctx.extract_timeout)
        }
        _ => Ok(value.as_text()),
    }
}

/// Expand `{column}` placeholders in a filename template from the row.
fn expand_template(
    template: &str,
    row_value: &dyn Fn(&str) -> Option<Value>,
) -> Result<String, veil_core::errors::ExtractError> {
    use veil_core::errors::ExtractError;

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find('}') else {
            return Err(ExtractError::Failed {
                message: format!("unclosed placeholder in template {template:?}"),
            });
        };
        let column = &tail[..end];
        let text = row_value(column).and_then(|v| v.as_text()).ok_or_else(|| {
            ExtractError::Failed {
                message: format!("template column {column:?} has no textual value"),
            }
        })?;
        out.push_str(&text);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use veil_core::config::ScrubOptions;
    use veil_core::hashing::{HashAlgorithm, HasherSet, KeyedHasher};
    use veil_core::traits::extractor::PlainTextExtractor;
    use veil_core::types::column::{
        ColumnFlags, Decision, IndexDirective, ScrubSourceRole, SourceDatatype,
    };
    use veil_core::FxHashMap;

    use crate::nonspecific::NonspecificScrubber;
    use crate::scrubber::Scrubber;

    fn scrubber() -> Scrubber {
        let ns =
            Arc::new(NonspecificScrubber::build(&ScrubOptions::default(), &[]).unwrap());
        Scrubber::new(
            vec![crate::scrubber::ScrubRule::compile(r"\bJohn\b").unwrap()],
            Vec::new(),
            ns,
            "[__PPP__]".to_string(),
            "[__TTT__]".to_string(),
            false,
            "digest".to_string(),
        )
    }

    fn hashers() -> HasherSet {
        let mut extras = FxHashMap::default();
        extras.insert(
            "episode".to_string(),
            KeyedHasher::new("episode", HashAlgorithm::HmacMd5, "ek").unwrap(),
        );
        HasherSet::new(
            KeyedHasher::new("pid", HashAlgorithm::HmacSha256, "pk").unwrap(),
            KeyedHasher::new("mpid", HashAlgorithm::HmacSha256, "mk").unwrap(),
            KeyedHasher::new("rows", HashAlgorithm::HmacMd5, "rk").unwrap(),
            extras,
        )
    }

    fn spec_with(alter: Vec<AlterMethod>) -> ColumnSpec {
        ColumnSpec {
            src_db: "ephr".into(),
            src_table: "notes".into(),
            src_field: "note".into(),
            src_datatype: SourceDatatype::Text,
            flags: ColumnFlags::default(),
            scrub_src: ScrubSourceRole::None,
            scrub_method: None,
            decision: Decision::Include,
            inclusion_values: None,
            exclusion_values: None,
            alter,
            dest_table: "notes".into(),
            dest_field: "note".into(),
            dest_datatype: "TEXT".into(),
            index: IndexDirective::None,
            index_len: None,
            comment: String::new(),
        }
    }

    fn run(spec: &ColumnSpec, raw: Value) -> AlterResult {
        let scrubber = scrubber();
        let hashers = hashers();
        let ctx = AlterContext {
            scrubber: &scrubber,
            hashers: &hashers,
            extractor: &PlainTextExtractor,
            extract_timeout: Duration::from_secs(5),
        };
        apply_alter_pipeline(spec, &raw, &|_| None, &ctx).unwrap()
    }

    #[test]
    fn empty_pipeline_passes_through() {
        let result = run(&spec_with(vec![]), Value::Text("as is".into()));
        assert_eq!(result.cell, Some(Value::Text("as is".into())));
    }

    #[test]
    fn html_then_scrub() {
        let result = run(
            &spec_with(vec![
                AlterMethod::Scrub,
                AlterMethod::HtmlUntag,
                AlterMethod::HtmlUnescape,
            ]),
            Value::Text("&lt;b&gt;John&lt;/b&gt; seen".into()),
        );
        // Unescape exposes the tags, untag removes them, scrub runs last.
        assert_eq!(result.cell, Some(Value::Text("[__PPP__] seen".into())));
    }

    #[test]
    fn truncate_date_keeps_month() {
        let result = run(
            &spec_with(vec![AlterMethod::TruncateDate]),
            Value::Text("1990-09-02".into()),
        );
        assert_eq!(result.cell, Some(Value::Text("1990-09-01".into())));

        let result = run(
            &spec_with(vec![AlterMethod::TruncateDate]),
            Value::Text("garbage".into()),
        );
        assert_eq!(result.cell, Some(Value::Null));
    }

    #[test]
    fn hash_uses_named_hasher() {
        let result = run(
            &spec_with(vec![AlterMethod::Hash {
                hasher_tag: "episode".to_string(),
            }]),
            Value::Text("EP-1234".into()),
        );
        let expected = hashers().extra("episode").unwrap().hash("EP-1234");
        assert_eq!(result.cell, Some(Value::Text(expected)));
    }

    #[test]
    fn unknown_hasher_is_an_error() {
        let spec = spec_with(vec![AlterMethod::Hash {
            hasher_tag: "nope".to_string(),
        }]);
        let scrubber = scrubber();
        let hashers = hashers();
        let ctx = AlterContext {
            scrubber: &scrubber,
            hashers: &hashers,
            extractor: &PlainTextExtractor,
            extract_timeout: Duration::from_secs(5),
        };
        assert!(
            apply_alter_pipeline(&spec, &Value::Text("x".into()), &|_| None, &ctx).is_err()
        );
    }

    #[test]
    fn binary_extraction_feeds_scrub() {
        let spec = spec_with(vec![
            AlterMethod::BinaryToText {
                extension_column: "ext".to_string(),
            },
            AlterMethod::Scrub,
        ]);
        let scrubber = scrubber();
        let hashers = hashers();
        let ctx = AlterContext {
            scrubber: &scrubber,
            hashers: &hashers,
            extractor: &PlainTextExtractor,
            extract_timeout: Duration::from_secs(5),
        };
        let lookup = |col: &str| (col == "ext").then(|| Value::Text("txt".into()));
        let result = apply_alter_pipeline(
            &spec,
            &Value::Blob(b"John attended".to_vec()),
            &lookup,
            &ctx,
        )
        .unwrap();
        assert_eq!(
            result.cell,
            Some(Value::Text("[__PPP__] attended".into()))
        );
    }

    #[test]
    fn failed_extraction_nulls_or_skips() {
        let spec = spec_with(vec![AlterMethod::BinaryToText {
            extension_column: "ext".to_string(),
        }]);
        let result = run(&spec, Value::Blob(vec![0xFF, 0xFE]));
        assert_eq!(result.cell, Some(Value::Null));
        assert!(result.extract_failed);

        let spec = spec_with(vec![
            AlterMethod::BinaryToText {
                extension_column: "ext".to_string(),
            },
            AlterMethod::SkipIfExtractFails,
        ]);
        let result = run(&spec, Value::Blob(vec![0xFF, 0xFE]));
        assert_eq!(result.cell, None);
        assert!(result.extract_failed);
    }

    #[test]
    fn template_expansion() {
        let lookup = |col: &str| match col {
            "dir" => Some(Value::Text("letters".into())),
            "doc_id" => Some(Value::Integer(42)),
            _ => None,
        };
        assert_eq!(
            expand_template("/docs/{dir}/{doc_id}.txt", &lookup).unwrap(),
            "/docs/letters/42.txt"
        );
        assert!(expand_template("/docs/{missing}.txt", &lookup).is_err());
        assert!(expand_template("/docs/{broken", &lookup).is_err());
    }
}
