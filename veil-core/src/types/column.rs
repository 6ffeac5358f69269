//! Per-column decision types: source datatypes, flag sets, scrub roles and
//! methods, alter methods, and index directives.
//!
//! These are parsed out of data-dictionary cells; every unknown token is a
//! hard error at load so a typo cannot silently weaken the de-identification.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Semantic datatype of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDatatype {
    Integer,
    Float,
    Date,
    Text,
    Blob,
    Other,
}

impl SourceDatatype {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" | "smallint" => Ok(Self::Integer),
            "float" | "real" | "double" | "decimal" | "numeric" => Ok(Self::Float),
            "date" | "datetime" | "timestamp" => Ok(Self::Date),
            "text" | "string" | "varchar" | "char" | "clob" => Ok(Self::Text),
            "blob" | "binary" | "varbinary" | "bytes" => Ok(Self::Blob),
            "" | "other" => Ok(Self::Other),
            other => Err(ConfigError::UnknownToken {
                cell: "src_datatype".to_string(),
                token: other.to_string(),
            }),
        }
    }
}

/// The nine column flags, parsed from the compact `src_flags` string.
///
/// Character mapping: `K` = primary key, `H` = add source hash, `C` =
/// constant content, `A` = addition only, `P` = primary patient ID,
/// `*` = defines the primary-PID universe, `M` = master patient ID,
/// `!` = opt-out marker, `R` = required scrubber input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub pk: bool,
    pub add_source_hash: bool,
    pub constant: bool,
    pub addition_only: bool,
    pub primary_pid: bool,
    pub defines_primary_pids: bool,
    pub master_pid: bool,
    pub opt_out: bool,
    pub required_scrubber: bool,
}

impl ColumnFlags {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let mut flags = Self::default();
        for ch in token.trim().chars() {
            match ch {
                'K' => flags.pk = true,
                'H' => flags.add_source_hash = true,
                'C' => flags.constant = true,
                'A' => flags.addition_only = true,
                'P' => flags.primary_pid = true,
                '*' => flags.defines_primary_pids = true,
                'M' => flags.master_pid = true,
                '!' => flags.opt_out = true,
                'R' => flags.required_scrubber = true,
                other => {
                    return Err(ConfigError::UnknownToken {
                        cell: "src_flags".to_string(),
                        token: other.to_string(),
                    })
                }
            }
        }
        Ok(flags)
    }

    /// True when the table this column belongs to participates in the
    /// incremental row-hash protocol.
    pub fn hashed(&self) -> bool {
        self.add_source_hash || self.constant
    }
}

/// Which scrubber a source column's values feed, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrubSourceRole {
    #[default]
    None,
    Patient,
    ThirdParty,
    /// The value is the PID of *another* patient whose identifiers should be
    /// scrubbed as third-party information.
    ThirdPartyXrefPid,
}

impl ScrubSourceRole {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "patient" => Ok(Self::Patient),
            "thirdparty" | "third_party" => Ok(Self::ThirdParty),
            "thirdparty_xref_pid" | "third_party_xref_pid" => Ok(Self::ThirdPartyXrefPid),
            other => Err(ConfigError::UnknownToken {
                cell: "scrub_src".to_string(),
                token: other.to_string(),
            }),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// How a scrub-source value is turned into rewrite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrubMethod {
    Words,
    Phrase,
    PhraseUnlessNumeric,
    Number,
    Code,
    Date,
}

impl ScrubMethod {
    pub fn parse(token: &str) -> Result<Option<Self>, ConfigError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "words" => Ok(Some(Self::Words)),
            "phrase" => Ok(Some(Self::Phrase)),
            "phrase_unless_numeric" => Ok(Some(Self::PhraseUnlessNumeric)),
            "number" => Ok(Some(Self::Number)),
            "code" => Ok(Some(Self::Code)),
            "date" => Ok(Some(Self::Date)),
            other => Err(ConfigError::UnknownToken {
                cell: "scrub_method".to_string(),
                token: other.to_string(),
            }),
        }
    }

    /// Method used when the dictionary leaves the cell blank: dates scrub as
    /// dates, integers as numbers, everything else as words.
    pub fn default_for(datatype: SourceDatatype) -> Self {
        match datatype {
            SourceDatatype::Date => Self::Date,
            SourceDatatype::Integer | SourceDatatype::Float => Self::Number,
            _ => Self::Words,
        }
    }
}

/// Whether the column reaches the destination at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Omit,
    Include,
}

impl Decision {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "omit" => Ok(Self::Omit),
            "include" => Ok(Self::Include),
            other => Err(ConfigError::UnknownToken {
                cell: "decision".to_string(),
                token: other.to_string(),
            }),
        }
    }

    pub fn include(&self) -> bool {
        matches!(self, Self::Include)
    }
}

/// One step of the per-column alter pipeline, in application order:
/// text extraction, HTML cleanup, date truncation, hashing, scrubbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterMethod {
    Scrub,
    TruncateDate,
    /// Treat the cell as a binary document; the named sibling column holds
    /// the file extension.
    BinaryToText { extension_column: String },
    /// Treat the cell as a filename to read and extract.
    FilenameToText,
    /// Build the filename from a template with `{column}` placeholders,
    /// then read and extract.
    FilenameFormatToText { template: String },
    /// Drop the whole row when text extraction fails, instead of writing a
    /// null cell.
    SkipIfExtractFails,
    HtmlUnescape,
    HtmlUntag,
    /// Replace the cell with the digest of the named extra hasher.
    Hash { hasher_tag: String },
}

impl AlterMethod {
    /// Parse the comma-separated `alter_method` cell. Arguments are supplied
    /// as `name=value` (e.g. `binary_to_text=doc_ext`, `hash=episode`).
    pub fn parse_list(cell: &str) -> Result<Vec<Self>, ConfigError> {
        let mut methods = Vec::new();
        for raw in cell.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (name, arg) = match raw.split_once('=') {
                Some((n, a)) => (n.trim(), Some(a.trim())),
                None => (raw, None),
            };
            let method = match (name.to_ascii_lowercase().as_str(), arg) {
                ("scrub", None) => Self::Scrub,
                ("truncate_date", None) => Self::TruncateDate,
                ("binary_to_text", Some(col)) if !col.is_empty() => Self::BinaryToText {
                    extension_column: col.to_string(),
                },
                ("filename_to_text", None) => Self::FilenameToText,
                ("filename_format_to_text", Some(tpl)) if !tpl.is_empty() => {
                    Self::FilenameFormatToText {
                        template: tpl.to_string(),
                    }
                }
                ("skip_if_extract_fails", None) => Self::SkipIfExtractFails,
                ("html_unescape", None) => Self::HtmlUnescape,
                ("html_untag", None) => Self::HtmlUntag,
                ("hash", Some(tag)) if !tag.is_empty() => Self::Hash {
                    hasher_tag: tag.to_string(),
                },
                _ => {
                    return Err(ConfigError::UnknownToken {
                        cell: "alter_method".to_string(),
                        token: raw.to_string(),
                    })
                }
            };
            methods.push(method);
        }
        Ok(methods)
    }

    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            Self::BinaryToText { .. } | Self::FilenameToText | Self::FilenameFormatToText { .. }
        )
    }
}

/// Destination index directive for a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexDirective {
    #[default]
    None,
    Normal,
    Unique,
    FullText,
}

impl IndexDirective {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "normal" | "index" => Ok(Self::Normal),
            "unique" => Ok(Self::Unique),
            "fulltext" => Ok(Self::FullText),
            other => Err(ConfigError::UnknownToken {
                cell: "index".to_string(),
                token: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_all_characters() {
        let flags = ColumnFlags::parse("KH*PR").unwrap();
        assert!(flags.pk);
        assert!(flags.add_source_hash);
        assert!(flags.defines_primary_pids);
        assert!(flags.primary_pid);
        assert!(flags.required_scrubber);
        assert!(!flags.constant);
        assert!(flags.hashed());
    }

    #[test]
    fn flags_reject_unknown_character() {
        assert!(ColumnFlags::parse("KQ").is_err());
    }

    #[test]
    fn alter_methods_parse_with_arguments() {
        let methods =
            AlterMethod::parse_list("binary_to_text=doc_ext, skip_if_extract_fails, scrub")
                .unwrap();
        assert_eq!(
            methods,
            vec![
                AlterMethod::BinaryToText {
                    extension_column: "doc_ext".to_string()
                },
                AlterMethod::SkipIfExtractFails,
                AlterMethod::Scrub,
            ]
        );
    }

    #[test]
    fn alter_methods_reject_missing_argument() {
        assert!(AlterMethod::parse_list("hash").is_err());
        assert!(AlterMethod::parse_list("binary_to_text").is_err());
    }

    #[test]
    fn scrub_method_defaults_follow_datatype() {
        assert_eq!(
            ScrubMethod::default_for(SourceDatatype::Date),
            ScrubMethod::Date
        );
        assert_eq!(
            ScrubMethod::default_for(SourceDatatype::Integer),
            ScrubMethod::Number
        );
        assert_eq!(
            ScrubMethod::default_for(SourceDatatype::Text),
            ScrubMethod::Words
        );
    }
}
