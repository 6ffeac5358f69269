//! The per-patient aggregate built before any of the patient's rows move.

use veil_core::traits::admin::PatientIds;
use veil_core::traits::source::SourceDatabase;
use veil_core::{DataDictionary, FxHashMap, Value};
use veil_scrub::Scrubber;

/// Everything a worker needs while processing one patient's rows.
pub struct Patient {
    pub pid: Value,
    pub pid_text: String,
    pub ids: PatientIds,
    pub mpid: Option<String>,
    pub mrid: Option<String>,
    pub scrubber: Scrubber,
    /// True when the scrubber digest changed (or was absent): the row-hash
    /// fast path is disabled and every row is rewritten.
    pub force_rewrite: bool,
}

/// First non-null master patient ID found for this patient across all
/// source databases.
pub fn find_mpid(
    dd: &DataDictionary,
    sources: &FxHashMap<String, Box<dyn SourceDatabase>>,
    pid: &Value,
) -> Result<Option<String>, veil_core::errors::StorageError> {
    let mut tags: Vec<&String> = sources.keys().collect();
    tags.sort_unstable();
    for tag in tags {
        let source = &sources[tag.as_str()];
        for table in dd.patient_tables(tag) {
            let Some(mpid_col) = dd.master_pid_column(tag, table) else {
                continue;
            };
            let Some(pid_col) = dd.primary_pid_column(tag, table) else {
                continue;
            };
            let values = source.distinct_nonnull_values(
                table,
                &mpid_col.src_field,
                &pid_col.src_field,
                pid,
            )?;
            if let Some(text) = values.iter().find_map(Value::as_text) {
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}
