//! Workspace-wide constants: replacement defaults, surface column names,
//! commit thresholds, and the permitted date-blur directives.

/// Replacement text for patient-identifying matches.
pub const DEFAULT_REPLACE_PATIENT: &str = "[__PPP__]";

/// Replacement text for third-party-identifying matches.
pub const DEFAULT_REPLACE_THIRD_PARTY: &str = "[__TTT__]";

/// Replacement text for nonspecific matches (denylist, postcodes, emails, …).
pub const DEFAULT_REPLACE_NONSPECIFIC: &str = "[~~~]";

/// Rows buffered per worker before a destination commit is forced.
pub const DEFAULT_MAX_ROWS_BEFORE_COMMIT: usize = 1_000;

/// Approximate bytes buffered per worker before a destination commit is forced.
pub const DEFAULT_MAX_BYTES_BEFORE_COMMIT: usize = 80 * 1024 * 1024;

/// Timestamp column added to every destination table.
pub const TIMESTAMP_COLUMN: &str = "_when_processed_utc";

/// Per-row source-content hash column added to hashed destination tables.
pub const SOURCE_HASH_COLUMN: &str = "_src_hash";

/// Transient research ID column added wherever a RID column is written.
pub const TRID_COLUMN: &str = "trid";

/// Strftime directives permitted inside `replace_all_dates_with`.
/// Day-of-month directives are deliberately absent: blurred dates must not
/// retain the day.
pub const ALLOWED_DATE_BLUR_DIRECTIVES: &[&str] = &["%b", "%B", "%m", "%Y", "%y"];

/// Default maximum recursion depth when expanding third-party
/// cross-referenced patients into a scrubber.
pub const DEFAULT_THIRDPARTY_XREF_MAX_DEPTH: u32 = 1;

/// Sentinel stored as the row hash for `CONSTANT`-flagged tables, where
/// content never changes and the hash is trivially constant.
pub const CONSTANT_ROW_HASH: &str = "constant";
