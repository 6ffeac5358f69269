//! The run driver: DDL, patient partitioning, parallel workers, non-patient
//! table units, end-of-run reconciliation, and index creation.

use std::sync::Arc;
use std::time::Instant;

use veil_core::config::VeilConfig;
use veil_core::errors::{ConfigError, RunError};
use veil_core::events::{RunEventHandler, RunSummary};
use veil_core::hashing::HasherSet;
use veil_core::traits::admin::AdminStore;
use veil_core::traits::destination::Databases;
use veil_core::traits::extractor::TextExtractor;
use veil_core::traits::source::RowFilter;
use veil_core::types::column::{AlterMethod, SourceDatatype};
use veil_core::{DataDictionary, FxHashSet, Value};
use veil_scrub::builder::ScrubberBuilder;
use veil_scrub::nonspecific::NonspecificScrubber;
use veil_scrub::wordlist;

use crate::cancel::Cancellation;
use crate::ddl;
use crate::introspect::IntrospectionCache;
use crate::optout::OptOutSources;
use crate::partition::{partition_pids, pk_ranges};
use crate::worker::{process_patients, process_table_unit, TableUnit, WorkerContext};

/// Full rebuilds drop and recreate the destination; incremental runs keep it
/// and skip unchanged hashed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Incremental,
}

/// Drives one de-identification run.
pub struct Orchestrator {
    config: VeilConfig,
    dd: Arc<DataDictionary>,
    databases: Arc<dyn Databases>,
    admin: Arc<dyn AdminStore>,
    extractor: Arc<dyn TextExtractor>,
    events: Arc<dyn RunEventHandler>,
    cancel: Cancellation,
    introspection: IntrospectionCache,
}

impl Orchestrator {
    pub fn new(
        config: VeilConfig,
        dd: Arc<DataDictionary>,
        databases: Arc<dyn Databases>,
        admin: Arc<dyn AdminStore>,
        extractor: Arc<dyn TextExtractor>,
        events: Arc<dyn RunEventHandler>,
    ) -> Self {
        Self {
            config,
            dd,
            databases,
            admin,
            extractor,
            events,
            cancel: Cancellation::new(),
            introspection: IntrospectionCache::new(256),
        }
    }

    /// Handle for external cancellation (signal handlers, tests).
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    pub fn run(&self, mode: RunMode) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let hashers = self.config.build_hashers()?;
        self.preflight(&hashers)?;

        let allowlist = wordlist::load_set(&self.config.scrub.allowlist_filenames)
            .map_err(RunError::Scrub)?;
        let denylist = wordlist::load_files(&self.config.scrub.denylist_filenames)
            .map_err(RunError::Scrub)?;
        let nonspecific = Arc::new(
            NonspecificScrubber::build(&self.config.scrub, &denylist).map_err(RunError::Scrub)?,
        );
        let optout = OptOutSources::load(&self.config)?;

        self.prepare_destination(mode, &hashers)?;
        self.cancel.check()?;

        let digest_hasher = hashers.rows.clone();
        let builder = ScrubberBuilder::new(
            &self.dd,
            &self.config.scrub,
            &allowlist,
            Arc::clone(&nonspecific),
            &digest_hasher,
        );
        let ctx = WorkerContext {
            dd: &self.dd,
            config: &self.config,
            hashers: &hashers,
            databases: self.databases.as_ref(),
            admin: self.admin.as_ref(),
            extractor: self.extractor.as_ref(),
            events: self.events.as_ref(),
            optout: &optout,
            builder: &builder,
            nonspecific: Arc::clone(&nonspecific),
            cancel: self.cancel.clone(),
            mode,
        };

        let workers = self.config.run.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("veil-worker-{i}"))
            .build()
            .map_err(|e| RunError::Worker {
                message: e.to_string(),
            })?;

        let mut summary = RunSummary::default();

        // Phase 1: patients, partitioned into disjoint PID sets.
        let pids = self.enumerate_pids()?;
        tracing::info!(patients = pids.len(), workers, "patient phase starting");
        for tag in self.config.databases.source_tags() {
            for table in self.dd.patient_tables(tag) {
                self.events.on_table_started(tag, table);
                summary.tables_processed += 1;
            }
        }
        let partitions = partition_pids(pids, workers);
        self.run_units(&pool, &ctx, &partitions, &mut summary, |ctx, part| {
            process_patients(ctx, part)
        })?;
        self.cancel.check()?;

        // Phase 2: non-patient tables, ranged or whole.
        let units = self.plan_table_units(mode)?;
        self.run_units(&pool, &ctx, &units, &mut summary, |ctx, unit| {
            process_table_unit(ctx, unit)
        })?;
        self.cancel.check()?;

        // Phase 3: reconcile rows that vanished from the source.
        self.reconcile(mode, &hashers, &mut summary)?;
        self.cancel.check()?;

        // Phase 4: indexes, one table per worker, serial within a table.
        self.create_indexes(&pool)?;

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.events.on_run_complete(&summary);
        tracing::info!(
            rows_written = summary.rows_written,
            rows_skipped = summary.rows_skipped_unchanged,
            patients = summary.patients_processed,
            opted_out = summary.patients_opted_out,
            duration_ms = summary.duration_ms,
            "run complete"
        );
        Ok(summary)
    }

    /// Fan work units out over the pool, funnel per-unit summaries back over
    /// a channel, and absorb them; the first error aborts the run.
    fn run_units<U: Sync>(
        &self,
        pool: &rayon::ThreadPool,
        ctx: &WorkerContext<'_>,
        units: &[U],
        summary: &mut RunSummary,
        work: impl Fn(&WorkerContext<'_>, &U) -> Result<RunSummary, RunError> + Sync,
    ) -> Result<(), RunError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        pool.scope(|scope| {
            for unit in units {
                let tx = tx.clone();
                let work = &work;
                scope.spawn(move |_| {
                    let _ = tx.send(work(ctx, unit));
                });
            }
        });
        drop(tx);
        for result in rx {
            let unit_summary = result?;
            summary.absorb(&unit_summary);
        }
        Ok(())
    }

    /// Startup checks beyond DD validation: every `hash=tag` alter method
    /// must reference a configured extra hasher.
    fn preflight(&self, hashers: &HasherSet) -> Result<(), RunError> {
        for tag in self.config.databases.source_tags() {
            for table in self.dd.source_tables(tag) {
                for spec in self.dd.columns_for(tag, table) {
                    for method in &spec.alter {
                        if let AlterMethod::Hash { hasher_tag } = method {
                            if hashers.extra(hasher_tag).is_none() {
                                return Err(RunError::Config(ConfigError::InvalidOption {
                                    option: format!("hashers.extras.{hasher_tag}"),
                                    message: format!(
                                        "referenced by alter method on {}",
                                        spec.locator()
                                    ),
                                }));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Create (full: drop and recreate) every destination table.
    fn prepare_destination(&self, mode: RunMode, hashers: &HasherSet) -> Result<(), RunError> {
        let dest = self.databases.open_destination().map_err(RunError::Storage)?;
        if mode == RunMode::Full {
            if self.config.run.effective_wipe_admin_on_full() {
                tracing::warn!("wiping the identifier store; research IDs will be reissued");
                self.admin.wipe_all().map_err(RunError::Storage)?;
            }
            for table in self.dd.dest_tables() {
                dest.exec_ddl(&ddl::drop_table_sql(table))
                    .map_err(RunError::Storage)?;
                self.introspection.invalidate(table);
            }
        }
        for table in self.dd.dest_tables() {
            let existed = mode == RunMode::Incremental
                && dest.table_exists(table).map_err(RunError::Storage)?;
            dest.exec_ddl(&ddl::create_table_sql(&self.dd, table, hashers))
                .map_err(RunError::Storage)?;

            // Schema check for tables that predate this run: a column
            // added to the dictionary will not appear via CREATE IF NOT
            // EXISTS, and silently dropping it would be worse than failing.
            if existed {
                let existing = self
                    .introspection
                    .columns(dest.as_ref(), table)
                    .map_err(RunError::Storage)?;
                for column in ddl::write_columns(&self.dd, table) {
                    if !existing.contains(&column) {
                        return Err(RunError::Config(ConfigError::InvalidOption {
                            option: format!("destination table {table}"),
                            message: format!(
                                "column {column} is missing from the existing table; \
                                 run a full rebuild"
                            ),
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    /// The patient universe: distinct PIDs of every database's defining
    /// column, deduplicated (the PID namespace is shared across sources)
    /// and sorted for deterministic partitioning.
    fn enumerate_pids(&self) -> Result<Vec<Value>, RunError> {
        let mut seen = FxHashSet::default();
        let mut pids = Vec::new();
        for tag in self.config.databases.source_tags() {
            let Some(defines) = self.dd.defines_primary_pids_column(tag) else {
                continue;
            };
            let source = self.databases.open_source(tag).map_err(RunError::Storage)?;
            for pid in source
                .distinct_pids(&defines.src_table, &defines.src_field)
                .map_err(RunError::Storage)?
            {
                if let Some(key) = pid.as_text() {
                    if seen.insert(key) {
                        pids.push(pid);
                    }
                }
            }
        }
        pids.sort_by_key(|pid| pid.as_text().unwrap_or_default());
        Ok(pids)
    }

    /// Partition non-patient tables: PK ranges for integer keys, otherwise
    /// one serialised whole-table unit (wiped first when there is no PK to
    /// upsert on during an incremental run).
    fn plan_table_units(&self, mode: RunMode) -> Result<Vec<TableUnit>, RunError> {
        let workers = self.config.run.effective_workers();
        let mut units = Vec::new();
        for tag in self.config.databases.source_tags() {
            let mut probe = None;
            for table in self.dd.non_patient_tables(tag) {
                if self.dd.dest_table_for(tag, table).is_none() {
                    continue;
                }
                let pk = self.dd.pk_column(tag, table);
                if let Some(pk) = pk.filter(|pk| pk.src_datatype == SourceDatatype::Integer) {
                    if probe.is_none() {
                        probe = Some(self.databases.open_source(tag).map_err(RunError::Storage)?);
                    }
                    let probe = probe.as_ref().expect("probe connection just opened");
                    if let Some((min, max)) = probe
                        .integer_pk_range(table, &pk.src_field)
                        .map_err(RunError::Storage)?
                    {
                        for (low, high) in pk_ranges(min, max, workers) {
                            units.push(TableUnit::Range {
                                tag: tag.to_string(),
                                table: table.to_string(),
                                pk_field: pk.src_field.clone(),
                                low,
                                high,
                            });
                        }
                        continue;
                    }
                    // Empty table: nothing to fetch, reconciliation handles
                    // leftover destination rows.
                    continue;
                }
                units.push(TableUnit::Whole {
                    tag: tag.to_string(),
                    table: table.to_string(),
                    wipe_first: mode == RunMode::Incremental && pk.is_none(),
                });
            }
        }
        Ok(units)
    }

    /// Delete destination rows whose source PK vanished (incremental, never
    /// for addition-only tables) and drop their stored row hashes.
    ///
    /// Row hashes are keyed by the *raw* source PK; destination rows carry
    /// the *transformed* PK (a PID PK lands as its RID, a hashed PK as its
    /// digest), so the two keep-sets differ.
    fn reconcile(
        &self,
        mode: RunMode,
        hashers: &HasherSet,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let mut dest = self.databases.open_destination().map_err(RunError::Storage)?;
        for tag in self.config.databases.source_tags() {
            let source = self.databases.open_source(tag).map_err(RunError::Storage)?;
            for table in self.dd.source_tables(tag) {
                if self.dd.table_is_addition_only(tag, table) {
                    continue;
                }
                let Some(dest_table) = self.dd.dest_table_for(tag, table) else {
                    continue;
                };
                let Some(pk) = self.dd.pk_column(tag, table) else {
                    continue;
                };
                let pk_transform = pk_transform(pk, hashers)?;

                let mut raw_seen = FxHashSet::default();
                let mut dest_seen = FxHashSet::default();
                let columns = vec![pk.src_field.clone()];
                for row in source
                    .fetch_rows(table, &columns, RowFilter::All)
                    .map_err(RunError::Storage)?
                {
                    self.cancel.check()?;
                    let row = row.map_err(RunError::Storage)?;
                    if let Some(key) = row.values.first().and_then(Value::as_text) {
                        dest_seen.insert(match &pk_transform {
                            Some(hasher) => hasher.hash(&key),
                            None => key.clone(),
                        });
                        raw_seen.insert(key);
                    }
                }

                if mode == RunMode::Incremental {
                    let deleted = dest
                        .delete_pks_not_in(dest_table, &pk.dest_field, &dest_seen)
                        .map_err(RunError::Storage)?;
                    if deleted > 0 {
                        self.events.on_rows_deleted(dest_table, deleted);
                        summary.rows_deleted += deleted;
                    }
                }
                if self.dd.table_is_hashed(tag, table) {
                    self.admin
                        .purge_row_hashes(dest_table, Some(&raw_seen))
                        .map_err(RunError::Storage)?;
                }
            }
        }
        Ok(())
    }

    /// Index creation: tables in parallel, statements within a table serial.
    fn create_indexes(&self, pool: &rayon::ThreadPool) -> Result<(), RunError> {
        use rayon::prelude::*;

        let tables = self.dd.dest_tables();
        pool.install(|| {
            tables.par_iter().try_for_each(|table| {
                let dest = self.databases.open_destination()?;
                for sql in ddl::index_sql(&self.dd, table) {
                    dest.exec_ddl(&sql)?;
                }
                Ok(())
            })
        })
        .map_err(RunError::Storage)
    }
}

/// How a table's PK is transformed on its way to the destination: a PID PK
/// becomes its RID, a master-PID PK its MRID, a `hash=tag` PK its digest.
fn pk_transform<'h>(
    pk: &veil_core::dd::ColumnSpec,
    hashers: &'h HasherSet,
) -> Result<Option<&'h veil_core::hashing::KeyedHasher>, RunError> {
    if pk.flags.primary_pid {
        return Ok(Some(&hashers.pid));
    }
    if pk.flags.master_pid {
        return Ok(Some(&hashers.mpid));
    }
    for method in &pk.alter {
        if let AlterMethod::Hash { hasher_tag } = method {
            return hashers
                .extra(hasher_tag)
                .map(Some)
                .ok_or_else(|| {
                    RunError::Config(ConfigError::InvalidOption {
                        option: format!("hashers.extras.{hasher_tag}"),
                        message: format!("referenced by alter method on {}", pk.locator()),
                    })
                });
        }
    }
    Ok(None)
}
