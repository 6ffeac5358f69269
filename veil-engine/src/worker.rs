//! Per-worker processing: one patient at a time, all of the patient's
//! tables, with batched destination commits and the incremental row-hash
//! fast path.
//!
//! Workers share nothing but the backing stores: each opens its own source
//! and destination connections from the `Databases` factory.

use std::sync::Arc;

use veil_core::config::VeilConfig;
use veil_core::constants::CONSTANT_ROW_HASH;
use veil_core::errors::{RunError, StorageError};
use veil_core::events::{RunEventHandler, RunSummary};
use veil_core::hashing::{row_fingerprint, HasherSet};
use veil_core::traits::admin::AdminStore;
use veil_core::traits::destination::{Databases, DestinationDatabase};
use veil_core::traits::extractor::TextExtractor;
use veil_core::traits::source::{RowFilter, SourceDatabase};
use veil_core::types::column::ScrubSourceRole;
use veil_core::{DataDictionary, FxHashMap, Value};
use veil_scrub::alter::{apply_alter_pipeline, AlterContext};
use veil_scrub::builder::{BuiltScrubber, ScrubberBuilder};
use veil_scrub::nonspecific::NonspecificScrubber;
use veil_scrub::Scrubber;

use crate::cancel::Cancellation;
use crate::ddl;
use crate::optout::OptOutSources;
use crate::orchestrator::RunMode;
use crate::patient::{find_mpid, Patient};
use crate::retry::with_backoff;

/// Read-only run state shared by every worker.
pub struct WorkerContext<'run> {
    pub dd: &'run DataDictionary,
    pub config: &'run VeilConfig,
    pub hashers: &'run HasherSet,
    pub databases: &'run dyn Databases,
    pub admin: &'run dyn AdminStore,
    pub extractor: &'run dyn TextExtractor,
    pub events: &'run dyn RunEventHandler,
    pub optout: &'run OptOutSources,
    pub builder: &'run ScrubberBuilder<'run>,
    pub nonspecific: Arc<NonspecificScrubber>,
    pub cancel: Cancellation,
    pub mode: RunMode,
}

/// One unit of non-patient work.
#[derive(Debug, Clone)]
pub enum TableUnit {
    /// A whole table, processed serially by one worker. `wipe_first` clears
    /// the destination rows beforehand (incremental reprocessing of a table
    /// with no PK to upsert on).
    Whole {
        tag: String,
        table: String,
        wipe_first: bool,
    },
    /// One PK range of a table partitioned across workers.
    Range {
        tag: String,
        table: String,
        pk_field: String,
        low: i64,
        high: i64,
    },
}

/// Process one worker's set of patients.
pub fn process_patients(
    ctx: &WorkerContext<'_>,
    pids: &[Value],
) -> Result<RunSummary, RunError> {
    let sources = open_sources(ctx)?;
    let mut dest = ctx.databases.open_destination().map_err(RunError::Storage)?;
    let mut summary = RunSummary::default();

    for pid in pids {
        ctx.cancel.check()?;
        process_one_patient(ctx, &sources, dest.as_mut(), pid, &mut summary)?;
    }
    Ok(summary)
}

/// Process one unit of a non-patient table.
pub fn process_table_unit(
    ctx: &WorkerContext<'_>,
    unit: &TableUnit,
) -> Result<RunSummary, RunError> {
    let mut dest = ctx.databases.open_destination().map_err(RunError::Storage)?;
    let mut summary = RunSummary::default();
    let scrubber =
        Scrubber::nonspecific_only(Arc::clone(&ctx.nonspecific), &ctx.config.scrub);

    let (tag, table) = match unit {
        TableUnit::Whole { tag, table, .. } | TableUnit::Range { tag, table, .. } => {
            (tag.as_str(), table.as_str())
        }
    };
    let source = ctx.databases.open_source(tag).map_err(RunError::Storage)?;
    ctx.events.on_table_started(tag, table);

    if let TableUnit::Whole {
        wipe_first: true, ..
    } = unit
    {
        if let Some(dest_table) = ctx.dd.dest_table_for(tag, table) {
            dest.exec_ddl(&format!("DELETE FROM {}", ddl::quote_ident(dest_table)))
                .map_err(RunError::Storage)?;
        }
    }

    let filter = match unit {
        TableUnit::Whole { .. } => RowFilter::All,
        TableUnit::Range {
            pk_field, low, high, ..
        } => RowFilter::PkRange(pk_field, *low, *high),
    };
    process_rows(
        ctx,
        source.as_ref(),
        dest.as_mut(),
        tag,
        table,
        &scrubber,
        None,
        false,
        filter,
        &mut summary,
    )?;
    summary.tables_processed += 1;
    Ok(summary)
}

fn open_sources(
    ctx: &WorkerContext<'_>,
) -> Result<FxHashMap<String, Box<dyn SourceDatabase>>, RunError> {
    let mut sources = FxHashMap::default();
    for tag in ctx.config.databases.source_tags() {
        sources.insert(
            tag.to_string(),
            ctx.databases.open_source(tag).map_err(RunError::Storage)?,
        );
    }
    Ok(sources)
}

fn process_one_patient(
    ctx: &WorkerContext<'_>,
    sources: &FxHashMap<String, Box<dyn SourceDatabase>>,
    dest: &mut dyn DestinationDatabase,
    pid: &Value,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    let Some(pid_text) = pid.as_text() else {
        tracing::warn!("patient ID with no textual form; skipped");
        return Ok(());
    };

    let mpid = find_mpid(ctx.dd, sources, pid).map_err(RunError::Storage)?;

    // Opt-out wins over everything else: record, delete, stop.
    if ctx
        .optout
        .opted_out(ctx.dd, sources, ctx.admin, pid, mpid.as_deref())
        .map_err(RunError::Storage)?
    {
        return apply_opt_out(ctx, dest, &pid_text, mpid.as_deref(), summary);
    }

    let ids = ctx
        .admin
        .get_or_create_rid(&pid_text)
        .map_err(RunError::Storage)?;

    let mrid = match &mpid {
        Some(mpid) => {
            let mrid = ctx.hashers.mpid.hash(mpid);
            ctx.admin
                .set_mrid(&pid_text, &mrid)
                .map_err(RunError::Storage)?;
            Some(mrid)
        }
        None => ids.mrid.clone(),
    };

    let scrubber = match ctx.builder.build_for_patient(sources, pid)? {
        BuiltScrubber::Ready(scrubber) => scrubber,
        BuiltScrubber::MissingRequired { column } => {
            // Previously written rows stay: they were de-identified with the
            // scrubber that existed when they were written.
            tracing::warn!(
                rid = %ids.rid,
                column = %column,
                "required scrubber source is empty; patient skipped"
            );
            ctx.events.on_patient_skipped(&ids.rid);
            summary.patients_skipped_missing_scrubber += 1;
            return Ok(());
        }
    };

    let prior_digest = ctx
        .admin
        .prior_scrubber_digest(&pid_text)
        .map_err(RunError::Storage)?;
    let force_rewrite = prior_digest.as_deref() != Some(scrubber.digest());

    let patient = Patient {
        pid: pid.clone(),
        pid_text,
        ids,
        mpid,
        mrid,
        scrubber,
        force_rewrite,
    };

    let mut tags: Vec<&String> = sources.keys().collect();
    tags.sort_unstable();
    for tag in tags {
        let source = &sources[tag.as_str()];
        for table in ctx.dd.patient_tables(tag) {
            let Some(pid_col) = ctx.dd.primary_pid_column(tag, table) else {
                continue;
            };
            let pid_field = pid_col.src_field.clone();
            process_rows(
                ctx,
                source.as_ref(),
                dest,
                tag,
                table,
                &patient.scrubber,
                Some(&patient),
                patient.force_rewrite,
                RowFilter::Eq(&pid_field, &patient.pid),
                summary,
            )?;
        }
    }

    ctx.admin
        .store_scrubber_digest(&patient.pid_text, patient.scrubber.digest())
        .map_err(RunError::Storage)?;
    summary.patients_processed += 1;
    Ok(())
}

/// Record the opt-out and delete every destination row keyed by the RID.
fn apply_opt_out(
    ctx: &WorkerContext<'_>,
    dest: &mut dyn DestinationDatabase,
    pid_text: &str,
    mpid: Option<&str>,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    ctx.admin
        .record_opt_out_pid(pid_text)
        .map_err(RunError::Storage)?;
    if let Some(mpid) = mpid {
        ctx.admin
            .record_opt_out_mpid(mpid)
            .map_err(RunError::Storage)?;
    }
    let ids = ctx
        .admin
        .get_or_create_rid(pid_text)
        .map_err(RunError::Storage)?;

    let rid = Value::Text(ids.rid.clone());
    for dest_table in ctx.dd.dest_tables() {
        let Some(rid_col) = ctx
            .dd
            .dest_columns(dest_table)
            .into_iter()
            .find(|s| s.flags.primary_pid)
        else {
            continue;
        };
        if !dest.table_exists(dest_table).map_err(RunError::Storage)? {
            continue;
        }
        let deleted = dest
            .delete_rows_eq(dest_table, &rid_col.dest_field, &rid)
            .map_err(RunError::Storage)?;
        if deleted > 0 {
            ctx.events.on_rows_deleted(dest_table, deleted);
            summary.rows_deleted += deleted;
        }
    }

    tracing::info!(rid = %ids.rid, "opt-out applied");
    ctx.events.on_opt_out_applied(&ids.rid);
    summary.patients_opted_out += 1;
    Ok(())
}

/// Stream one table's rows (for one patient, one PK range, or everything)
/// through filters, the incremental check, the alter pipeline, and the
/// batched destination writer.
#[allow(clippy::too_many_arguments)]
fn process_rows(
    ctx: &WorkerContext<'_>,
    source: &dyn SourceDatabase,
    dest: &mut dyn DestinationDatabase,
    tag: &str,
    table: &str,
    scrubber: &Scrubber,
    patient: Option<&Patient>,
    force_rewrite: bool,
    filter: RowFilter<'_>,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    let specs = ctx.dd.columns_for(tag, table);
    let Some(dest_table) = ctx.dd.dest_table_for(tag, table) else {
        return Ok(());
    };
    let src_fields: Vec<String> = specs.iter().map(|s| s.src_field.clone()).collect();
    let hashed = ctx.dd.table_is_hashed(tag, table);
    let constant = ctx.dd.table_is_constant(tag, table);
    let incremental = matches!(ctx.mode, RunMode::Incremental);
    let pk_index = specs.iter().position(|s| s.flags.pk);
    let has_trid = specs.iter().any(|s| s.included() && s.flags.primary_pid);
    let fingerprint_indices: Vec<usize> = specs
        .iter()
        .enumerate()
        .filter(|(_, s)| s.included() && s.scrub_src.is_none())
        .map(|(i, _)| i)
        .collect();

    // Incremental reprocessing of a non-hashed patient table with no PK to
    // upsert on: clear the patient's rows first, then reinsert.
    if incremental && !hashed && pk_index.is_none() {
        if let Some(p) = patient {
            if let Some(rid_col) = specs.iter().find(|s| s.included() && s.flags.primary_pid) {
                dest.delete_rows_eq(
                    dest_table,
                    &rid_col.dest_field,
                    &Value::Text(p.ids.rid.clone()),
                )
                .map_err(RunError::Storage)?;
            }
        }
    }

    let alter_ctx = AlterContext {
        scrubber,
        hashers: ctx.hashers,
        extractor: ctx.extractor,
        extract_timeout: ctx.config.run.effective_extract_timeout(),
    };
    let mut batcher = RowBatcher::new(
        dest_table.to_string(),
        ddl::write_columns(ctx.dd, dest_table),
        ctx.config.run.effective_max_rows_before_commit(),
        ctx.config.run.effective_max_bytes_before_commit(),
    );

    let rows = source
        .fetch_rows(table, &src_fields, filter)
        .map_err(RunError::Storage)?;
    for row in rows {
        ctx.cancel.check()?;
        let row = row.map_err(RunError::Storage)?;
        if row.values.len() != specs.len() {
            return Err(RunError::Storage(StorageError::Sqlite {
                message: format!("{tag}.{table}: fetched row width mismatch"),
            }));
        }

        // Inclusion/exclusion filters, on raw values.
        if !specs
            .iter()
            .zip(&row.values)
            .all(|(spec, value)| spec.passes_filters(value))
        {
            continue;
        }

        let pk_text = pk_index.and_then(|i| row.values[i].as_text());
        let src_hash = if hashed {
            Some(if constant {
                CONSTANT_ROW_HASH.to_string()
            } else {
                row_fingerprint(
                    &ctx.hashers.rows,
                    fingerprint_indices.iter().map(|&i| &row.values[i]),
                )
            })
        } else {
            None
        };

        // Incremental fast path: unchanged row, scrubber unchanged → skip.
        if incremental && !force_rewrite {
            if let (Some(hash), Some(pk)) = (&src_hash, &pk_text) {
                let stored = ctx
                    .admin
                    .get_row_hash(dest_table, pk)
                    .map_err(RunError::Storage)?;
                if stored.as_deref() == Some(hash.as_str()) {
                    summary.rows_skipped_unchanged += 1;
                    ctx.events.on_rows_skipped_unchanged(dest_table, 1);
                    continue;
                }
            }
        }

        let lookup = |field: &str| -> Option<Value> {
            specs
                .iter()
                .position(|s| s.src_field == field)
                .map(|i| row.values[i].clone())
        };

        let mut out: Vec<Value> = Vec::with_capacity(batcher.columns.len());
        let mut drop_row = false;
        for (spec, raw) in specs.iter().zip(&row.values) {
            if !spec.included() {
                continue;
            }
            let cell = if spec.flags.primary_pid {
                match patient {
                    Some(p) => Value::Text(p.ids.rid.clone()),
                    None => Value::Null,
                }
            } else if spec.flags.master_pid {
                match patient.and_then(|p| p.mrid.clone()) {
                    Some(mrid) => Value::Text(mrid),
                    None => Value::Null,
                }
            } else if spec.scrub_src == ScrubSourceRole::ThirdPartyXrefPid {
                // Cross-referenced PIDs leave as research IDs, like the
                // patient's own.
                match raw.as_text() {
                    Some(text) => Value::Text(ctx.hashers.pid.hash(&text)),
                    None => Value::Null,
                }
            } else {
                let result =
                    apply_alter_pipeline(spec, raw, &lookup, &alter_ctx).map_err(RunError::Scrub)?;
                match result.cell {
                    Some(value) => value,
                    None => {
                        summary.rows_dropped_extract_failed += 1;
                        drop_row = true;
                        break;
                    }
                }
            };
            out.push(cell);
        }
        if drop_row {
            continue;
        }

        if has_trid {
            out.push(match patient {
                Some(p) => Value::Integer(p.ids.trid),
                None => Value::Null,
            });
        }
        if let Some(hash) = &src_hash {
            out.push(Value::Text(hash.clone()));
        }
        out.push(Value::Text(now_utc()));

        let hash_entry = match (&src_hash, &pk_text) {
            (Some(hash), Some(pk)) => Some((pk.clone(), hash.clone())),
            _ => None,
        };
        batcher.push(out, hash_entry);
        if batcher.should_flush() {
            batcher.flush(ctx, dest, summary)?;
        }
    }
    batcher.flush(ctx, dest, summary)?;
    Ok(())
}

/// Per-table write batcher: commits at the row or byte threshold, stores
/// row hashes only after their batch has committed.
struct RowBatcher {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    pending_hashes: Vec<(String, String)>,
    bytes: usize,
    max_rows: usize,
    max_bytes: usize,
}

impl RowBatcher {
    fn new(table: String, columns: Vec<String>, max_rows: usize, max_bytes: usize) -> Self {
        Self {
            table,
            columns,
            rows: Vec::new(),
            pending_hashes: Vec::new(),
            bytes: 0,
            max_rows,
            max_bytes,
        }
    }

    fn push(&mut self, row: Vec<Value>, hash_entry: Option<(String, String)>) {
        self.bytes += row.iter().map(Value::approx_bytes).sum::<usize>();
        self.rows.push(row);
        if let Some(entry) = hash_entry {
            self.pending_hashes.push(entry);
        }
    }

    fn should_flush(&self) -> bool {
        self.rows.len() >= self.max_rows || self.bytes >= self.max_bytes
    }

    fn flush(
        &mut self,
        ctx: &WorkerContext<'_>,
        dest: &mut dyn DestinationDatabase,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        ctx.cancel.check()?;
        with_backoff(
            ctx.config.run.effective_max_retries(),
            ctx.config.run.effective_retry_base_delay(),
            || dest.write_rows(&self.table, &self.columns, &self.rows),
        )
        .map_err(RunError::Storage)?;

        for (pk, hash) in &self.pending_hashes {
            ctx.admin
                .store_row_hash(&self.table, pk, hash)
                .map_err(RunError::Storage)?;
        }

        ctx.events.on_rows_written(&self.table, self.rows.len());
        summary.rows_written += self.rows.len();
        self.rows.clear();
        self.pending_hashes.clear();
        self.bytes = 0;
        Ok(())
    }
}

fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
