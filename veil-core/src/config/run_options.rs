//! Orchestration options: parallelism, commit thresholds, retry bounds,
//! timeouts, and the full-run admin wipe switch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_BYTES_BEFORE_COMMIT, DEFAULT_MAX_ROWS_BEFORE_COMMIT};

/// Options for the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Parallel workers. Default: available parallelism.
    pub workers: Option<usize>,
    /// Rows buffered before a destination commit. Default 1000.
    pub max_rows_before_commit: Option<usize>,
    /// Approximate bytes buffered before a destination commit.
    /// Default 80 MiB.
    pub max_bytes_before_commit: Option<usize>,
    /// Maximum attempts for a transient database error. Default 5.
    pub max_retries: Option<u32>,
    /// Base delay for exponential backoff, in milliseconds. Default 250.
    pub retry_base_delay_ms: Option<u64>,
    /// Per-call database busy timeout, in milliseconds. Default 5000.
    pub db_busy_timeout_ms: Option<u64>,
    /// Per-document text-extraction timeout, in milliseconds. Default 60000.
    pub extract_timeout_ms: Option<u64>,
    /// On a full run, also wipe the identifier store (research IDs are
    /// regenerated; existing downstream links break). Default false.
    pub wipe_admin_on_full: Option<bool>,
}

impl RunOptions {
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn effective_max_rows_before_commit(&self) -> usize {
        self.max_rows_before_commit
            .unwrap_or(DEFAULT_MAX_ROWS_BEFORE_COMMIT)
    }

    pub fn effective_max_bytes_before_commit(&self) -> usize {
        self.max_bytes_before_commit
            .unwrap_or(DEFAULT_MAX_BYTES_BEFORE_COMMIT)
    }

    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(5)
    }

    pub fn effective_retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.unwrap_or(250))
    }

    pub fn effective_db_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.db_busy_timeout_ms.unwrap_or(5_000))
    }

    pub fn effective_extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms.unwrap_or(60_000))
    }

    pub fn effective_wipe_admin_on_full(&self) -> bool {
        self.wipe_admin_on_full.unwrap_or(false)
    }
}
