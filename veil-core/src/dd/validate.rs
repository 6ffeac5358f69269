//! Phase 2: dictionary invariants. Every violation is fatal at startup.

use crate::errors::ConfigError;
use crate::types::collections::{FxHashMap, FxHashSet};
use crate::types::column::{IndexDirective, ScrubSourceRole, SourceDatatype};

use super::column_spec::ColumnSpec;

pub fn validate(specs: &[ColumnSpec]) -> Result<(), ConfigError> {
    let mut seen: FxHashSet<(&str, &str, &str)> = FxHashSet::default();
    let mut pid_datatype: Option<(SourceDatatype, String)> = None;
    let mut defines_per_db: FxHashMap<&str, usize> = FxHashMap::default();
    let mut pid_tables: FxHashSet<(&str, &str)> = FxHashSet::default();
    let mut pk_per_table: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    let mut fulltext_per_dest: FxHashMap<&str, usize> = FxHashMap::default();
    let mut dest_fields: FxHashSet<(&str, &str)> = FxHashSet::default();
    let mut dest_src: FxHashMap<&str, (&str, &str)> = FxHashMap::default();

    for spec in specs {
        let loc = spec.locator();

        if !seen.insert((&spec.src_db, &spec.src_table, &spec.src_field)) {
            return Err(invariant(format!("duplicate column entry {loc}")));
        }

        if spec.flags.add_source_hash && spec.flags.constant {
            return Err(invariant(format!(
                "{loc}: ADD_SOURCE_HASH and CONSTANT are mutually exclusive"
            )));
        }
        if spec.flags.hashed() && !spec.flags.pk {
            return Err(invariant(format!(
                "{loc}: ADD_SOURCE_HASH/CONSTANT require the PK flag"
            )));
        }
        if spec.flags.hashed() && spec.index != IndexDirective::Unique {
            return Err(invariant(format!(
                "{loc}: hashed PK must carry a unique destination index"
            )));
        }
        if spec.flags.addition_only && !spec.flags.pk {
            return Err(invariant(format!(
                "{loc}: ADDITION_ONLY requires the PK flag"
            )));
        }
        if spec.flags.required_scrubber && spec.scrub_src.is_none() {
            return Err(invariant(format!(
                "{loc}: REQUIRED_SCRUBBER needs a scrub-source role"
            )));
        }
        if spec.scrub_src == ScrubSourceRole::ThirdPartyXrefPid && !spec.alter.is_empty() {
            return Err(invariant(format!(
                "{loc}: a third-party cross-reference PID is hashed implicitly \
                 and may not carry alter methods"
            )));
        }

        if spec.flags.primary_pid {
            pid_tables.insert((&spec.src_db, &spec.src_table));
            match &pid_datatype {
                None => pid_datatype = Some((spec.src_datatype, loc.clone())),
                Some((datatype, first)) if *datatype != spec.src_datatype => {
                    return Err(invariant(format!(
                        "primary PID datatype differs between {first} and {loc}; \
                         all tables must share one patient ID type"
                    )));
                }
                Some(_) => {}
            }
        }
        if spec.flags.defines_primary_pids {
            *defines_per_db.entry(spec.src_db.as_str()).or_default() += 1;
            if !spec.flags.primary_pid {
                return Err(invariant(format!(
                    "{loc}: DEFINES_PRIMARY_PIDS must be set on a PRIMARY_PID column"
                )));
            }
        }
        if spec.flags.pk {
            *pk_per_table
                .entry((&spec.src_db, &spec.src_table))
                .or_default() += 1;
        }

        if spec.included() {
            if spec.index == IndexDirective::FullText {
                *fulltext_per_dest.entry(&spec.dest_table).or_default() += 1;
            }
            if !dest_fields.insert((&spec.dest_table, &spec.dest_field)) {
                return Err(invariant(format!(
                    "destination column {}.{} is written by more than one source column",
                    spec.dest_table, spec.dest_field
                )));
            }
            match dest_src.get(spec.dest_table.as_str()) {
                None => {
                    dest_src.insert(&spec.dest_table, (&spec.src_db, &spec.src_table));
                }
                Some((db, table)) if *db != spec.src_db || *table != spec.src_table => {
                    return Err(invariant(format!(
                        "destination table {} is fed by both {db}.{table} and {}.{}",
                        spec.dest_table, spec.src_db, spec.src_table
                    )));
                }
                Some(_) => {}
            }
        }
    }

    // Second pass: table-level checks.
    let dbs: FxHashSet<&str> = specs.iter().map(|s| s.src_db.as_str()).collect();
    for db in dbs {
        let has_pid_tables = pid_tables.iter().any(|(d, _)| *d == db);
        let defines = defines_per_db.get(db).copied().unwrap_or(0);
        if defines > 1 {
            return Err(invariant(format!(
                "source database {db:?} has {defines} DEFINES_PRIMARY_PIDS columns; \
                 at most one is allowed"
            )));
        }
        if has_pid_tables && defines == 0 {
            return Err(invariant(format!(
                "source database {db:?} has patient tables but no \
                 DEFINES_PRIMARY_PIDS column to enumerate patients from"
            )));
        }
    }

    for spec in specs {
        if spec.flags.opt_out && !pid_tables.contains(&(spec.src_db.as_str(), spec.src_table.as_str()))
        {
            return Err(invariant(format!(
                "{}: OPT_OUT requires a PRIMARY_PID column in the same table",
                spec.locator()
            )));
        }
        if spec.flags.hashed() {
            let pks = pk_per_table
                .get(&(spec.src_db.as_str(), spec.src_table.as_str()))
                .copied()
                .unwrap_or(0);
            if pks != 1 {
                return Err(invariant(format!(
                    "{}.{}: hashed tables need exactly one PK column, found {pks}",
                    spec.src_db, spec.src_table
                )));
            }
        }
    }

    for (dest, count) in fulltext_per_dest {
        if count > 1 {
            return Err(invariant(format!(
                "destination table {dest} has {count} FULLTEXT indexes; at most one is allowed"
            )));
        }
    }

    Ok(())
}

fn invariant(message: String) -> ConfigError {
    ConfigError::Invariant { message }
}
