//! Phase 3: the loaded dictionary with its lookup indices and queries.

use std::path::Path;

use crate::errors::ConfigError;
use crate::types::collections::{FxHashMap, FxHashSet};
use crate::types::column::ScrubSourceRole;

use super::column_spec::ColumnSpec;
use super::parse::parse_dictionary;
use super::validate::validate;

/// The validated, immutable data dictionary.
///
/// Shared read-only across all workers; indices are built once at load.
pub struct DataDictionary {
    specs: Vec<ColumnSpec>,
    by_src_table: FxHashMap<(String, String), Vec<usize>>,
    by_dest_table: FxHashMap<String, Vec<usize>>,
    scrub_sources_by_db: FxHashMap<String, Vec<usize>>,
}

impl DataDictionary {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let specs = parse_dictionary(text)?;
        validate(&specs)?;

        let mut by_src_table: FxHashMap<(String, String), Vec<usize>> = FxHashMap::default();
        let mut by_dest_table: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut scrub_sources_by_db: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, spec) in specs.iter().enumerate() {
            by_src_table
                .entry((spec.src_db.clone(), spec.src_table.clone()))
                .or_default()
                .push(i);
            if spec.included() {
                by_dest_table
                    .entry(spec.dest_table.clone())
                    .or_default()
                    .push(i);
            }
            if !spec.scrub_src.is_none() {
                scrub_sources_by_db
                    .entry(spec.src_db.clone())
                    .or_default()
                    .push(i);
            }
        }

        tracing::debug!(columns = specs.len(), "data dictionary loaded");
        Ok(Self {
            specs,
            by_src_table,
            by_dest_table,
            scrub_sources_by_db,
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::load_from_str(&text)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    // ── source-side queries ──

    /// All source tables of a database, in dictionary order.
    pub fn source_tables(&self, db: &str) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.specs
            .iter()
            .filter(|s| s.src_db == db)
            .map(|s| s.src_table.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Tables carrying a PRIMARY_PID column: their rows belong to patients.
    pub fn patient_tables(&self, db: &str) -> Vec<&str> {
        self.source_tables(db)
            .into_iter()
            .filter(|t| self.primary_pid_column(db, t).is_some())
            .collect()
    }

    /// Tables without a PRIMARY_PID column.
    pub fn non_patient_tables(&self, db: &str) -> Vec<&str> {
        self.source_tables(db)
            .into_iter()
            .filter(|t| self.primary_pid_column(db, t).is_none())
            .collect()
    }

    /// All column specs for one source table, in dictionary order.
    pub fn columns_for(&self, db: &str, table: &str) -> Vec<&ColumnSpec> {
        self.by_src_table
            .get(&(db.to_string(), table.to_string()))
            .map(|idxs| idxs.iter().map(|&i| &self.specs[i]).collect())
            .unwrap_or_default()
    }

    pub fn primary_pid_column(&self, db: &str, table: &str) -> Option<&ColumnSpec> {
        self.columns_for(db, table)
            .into_iter()
            .find(|s| s.flags.primary_pid)
    }

    pub fn master_pid_column(&self, db: &str, table: &str) -> Option<&ColumnSpec> {
        self.columns_for(db, table)
            .into_iter()
            .find(|s| s.flags.master_pid)
    }

    pub fn pk_column(&self, db: &str, table: &str) -> Option<&ColumnSpec> {
        self.columns_for(db, table).into_iter().find(|s| s.flags.pk)
    }

    pub fn opt_out_column(&self, db: &str, table: &str) -> Option<&ColumnSpec> {
        self.columns_for(db, table)
            .into_iter()
            .find(|s| s.flags.opt_out)
    }

    /// The column that enumerates the patient universe for a database.
    /// Validation guarantees it exists whenever the database has patient
    /// tables.
    pub fn defines_primary_pids_column(&self, db: &str) -> Option<&ColumnSpec> {
        self.specs
            .iter()
            .find(|s| s.src_db == db && s.flags.defines_primary_pids)
    }

    /// All scrub-source columns of a database, every role.
    pub fn scrub_source_columns(&self, db: &str) -> Vec<&ColumnSpec> {
        self.scrub_sources_by_db
            .get(db)
            .map(|idxs| idxs.iter().map(|&i| &self.specs[i]).collect())
            .unwrap_or_default()
    }

    /// Scrub-source columns that must yield a value before the patient can
    /// be processed at all.
    pub fn required_scrubber_columns(&self, db: &str) -> Vec<&ColumnSpec> {
        self.scrub_source_columns(db)
            .into_iter()
            .filter(|s| s.flags.required_scrubber)
            .collect()
    }

    /// Third-party cross-reference PID columns of a database.
    pub fn xref_pid_columns(&self, db: &str) -> Vec<&ColumnSpec> {
        self.scrub_source_columns(db)
            .into_iter()
            .filter(|s| s.scrub_src == ScrubSourceRole::ThirdPartyXrefPid)
            .collect()
    }

    /// Whether the table participates in the incremental row-hash protocol.
    pub fn table_is_hashed(&self, db: &str, table: &str) -> bool {
        self.columns_for(db, table).iter().any(|s| s.flags.hashed())
    }

    /// Whether the table's content is declared constant (hash trivially
    /// unchanged while the row exists).
    pub fn table_is_constant(&self, db: &str, table: &str) -> bool {
        self.columns_for(db, table)
            .iter()
            .any(|s| s.flags.constant)
    }

    pub fn table_is_addition_only(&self, db: &str, table: &str) -> bool {
        self.columns_for(db, table)
            .iter()
            .any(|s| s.flags.addition_only)
    }

    // ── destination-side queries ──

    /// All destination tables, sorted for deterministic iteration.
    pub fn dest_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.by_dest_table.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }

    /// Included columns landing in one destination table, dictionary order.
    pub fn dest_columns(&self, dest_table: &str) -> Vec<&ColumnSpec> {
        self.by_dest_table
            .get(dest_table)
            .map(|idxs| idxs.iter().map(|&i| &self.specs[i]).collect())
            .unwrap_or_default()
    }

    /// The destination table one source table writes to, if any of its
    /// columns are included.
    pub fn dest_table_for(&self, db: &str, table: &str) -> Option<&str> {
        self.columns_for(db, table)
            .into_iter()
            .find(|s| s.included())
            .map(|s| s.dest_table.as_str())
    }

    /// The source (db, table) feeding a destination table.
    pub fn src_for_dest(&self, dest_table: &str) -> Option<(&str, &str)> {
        self.dest_columns(dest_table)
            .first()
            .map(|s| (s.src_db.as_str(), s.src_table.as_str()))
    }
}
