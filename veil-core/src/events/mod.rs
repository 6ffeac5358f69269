//! Run events: the instrumentation hook workers report through.
//!
//! Handlers observe writes, skips, deletions, and patient-level outcomes.
//! Identifiers in events are research IDs, never raw PIDs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::types::collections::FxHashMap;

/// End-of-run totals.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tables_processed: usize,
    pub rows_written: usize,
    pub rows_skipped_unchanged: usize,
    pub rows_deleted: usize,
    pub rows_dropped_extract_failed: usize,
    pub patients_processed: usize,
    pub patients_skipped_missing_scrubber: usize,
    pub patients_opted_out: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn absorb(&mut self, other: &RunSummary) {
        self.tables_processed += other.tables_processed;
        self.rows_written += other.rows_written;
        self.rows_skipped_unchanged += other.rows_skipped_unchanged;
        self.rows_deleted += other.rows_deleted;
        self.rows_dropped_extract_failed += other.rows_dropped_extract_failed;
        self.patients_processed += other.patients_processed;
        self.patients_skipped_missing_scrubber += other.patients_skipped_missing_scrubber;
        self.patients_opted_out += other.patients_opted_out;
    }
}

/// Observer for run progress. All methods default to no-ops.
pub trait RunEventHandler: Send + Sync {
    fn on_table_started(&self, _db: &str, _table: &str) {}
    fn on_rows_written(&self, _dest_table: &str, _count: usize) {}
    fn on_rows_skipped_unchanged(&self, _dest_table: &str, _count: usize) {}
    fn on_rows_deleted(&self, _dest_table: &str, _count: usize) {}
    fn on_patient_skipped(&self, _rid: &str) {}
    fn on_opt_out_applied(&self, _rid: &str) {}
    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// The default handler: ignores everything.
pub struct NullEventHandler;

impl RunEventHandler for NullEventHandler {}

/// Counting handler for tests and smoke instrumentation.
#[derive(Default)]
pub struct CountingEventHandler {
    rows_written: AtomicUsize,
    rows_skipped: AtomicUsize,
    rows_deleted: AtomicUsize,
    patients_skipped: AtomicUsize,
    opt_outs: AtomicUsize,
    writes_per_table: Mutex<FxHashMap<String, usize>>,
}

impl CountingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped.load(Ordering::Relaxed)
    }

    pub fn rows_deleted(&self) -> usize {
        self.rows_deleted.load(Ordering::Relaxed)
    }

    pub fn patients_skipped(&self) -> usize {
        self.patients_skipped.load(Ordering::Relaxed)
    }

    pub fn opt_outs(&self) -> usize {
        self.opt_outs.load(Ordering::Relaxed)
    }

    pub fn writes_to(&self, dest_table: &str) -> usize {
        self.writes_per_table
            .lock()
            .expect("event counter mutex poisoned")
            .get(dest_table)
            .copied()
            .unwrap_or(0)
    }
}

impl RunEventHandler for CountingEventHandler {
    fn on_rows_written(&self, dest_table: &str, count: usize) {
        self.rows_written.fetch_add(count, Ordering::Relaxed);
        *self
            .writes_per_table
            .lock()
            .expect("event counter mutex poisoned")
            .entry(dest_table.to_string())
            .or_default() += count;
    }

    fn on_rows_skipped_unchanged(&self, _dest_table: &str, count: usize) {
        self.rows_skipped.fetch_add(count, Ordering::Relaxed);
    }

    fn on_rows_deleted(&self, _dest_table: &str, count: usize) {
        self.rows_deleted.fetch_add(count, Ordering::Relaxed);
    }

    fn on_patient_skipped(&self, _rid: &str) {
        self.patients_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn on_opt_out_applied(&self, _rid: &str) {
        self.opt_outs.fetch_add(1, Ordering::Relaxed);
    }
}
