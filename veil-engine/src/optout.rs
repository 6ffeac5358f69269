//! Opt-out sources: file lists, marker columns, and the admin tables.
//!
//! Detection is a union over every source; recording is append-only in the
//! admin store.

use std::path::Path;

use veil_core::config::VeilConfig;
use veil_core::errors::{ConfigError, StorageError};
use veil_core::traits::admin::AdminStore;
use veil_core::traits::source::SourceDatabase;
use veil_core::{DataDictionary, FxHashMap, FxHashSet, Value};

/// File-supplied opt-out lists, loaded once per run.
pub struct OptOutSources {
    col_values: FxHashSet<String>,
    file_pids: FxHashSet<String>,
    file_mpids: FxHashSet<String>,
}

impl OptOutSources {
    pub fn load(config: &VeilConfig) -> Result<Self, ConfigError> {
        let options = &config.optout;
        Ok(Self {
            col_values: options.optout_col_values.iter().cloned().collect(),
            file_pids: load_id_files(&options.optout_pid_filenames)?,
            file_mpids: load_id_files(&options.optout_mpid_filenames)?,
        })
    }

    pub fn empty() -> Self {
        Self {
            col_values: FxHashSet::default(),
            file_pids: FxHashSet::default(),
            file_mpids: FxHashSet::default(),
        }
    }

    /// Union over every opt-out source for one patient: file lists, admin
    /// tables, and `OPT_OUT`-flagged column values.
    pub fn opted_out(
        &self,
        dd: &DataDictionary,
        sources: &FxHashMap<String, Box<dyn SourceDatabase>>,
        admin: &dyn AdminStore,
        pid: &Value,
        mpid: Option<&str>,
    ) -> Result<bool, StorageError> {
        let pid_text = pid.as_text().unwrap_or_default();
        if self.file_pids.contains(&pid_text) {
            return Ok(true);
        }
        if let Some(mpid) = mpid {
            if self.file_mpids.contains(mpid) {
                return Ok(true);
            }
        }
        if admin.opted_out(&pid_text, mpid)? {
            return Ok(true);
        }
        if !self.col_values.is_empty() {
            for (tag, source) in sources {
                for table in dd.patient_tables(tag) {
                    let Some(opt_col) = dd.opt_out_column(tag, table) else {
                        continue;
                    };
                    let Some(pid_col) = dd.primary_pid_column(tag, table) else {
                        continue;
                    };
                    let values = source.distinct_nonnull_values(
                        table,
                        &opt_col.src_field,
                        &pid_col.src_field,
                        pid,
                    )?;
                    for value in values {
                        if let Some(text) = value.as_text() {
                            if self.col_values.contains(&text) {
                                return Ok(true);
                            }
                        }
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Load identifier files: one ID per line, `#` comments and blanks ignored.
/// IDs keep their case, unlike scrub word lists.
fn load_id_files(paths: &[String]) -> Result<FxHashSet<String>, ConfigError> {
    let mut ids = FxHashSet::default();
    for path in paths {
        let text = std::fs::read_to_string(Path::new(path)).map_err(|e| ConfigError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                ids.insert(line.to_string());
            }
        }
    }
    Ok(ids)
}
