//! The identifier store: PID↔RID mappings, opt-outs, and change-detection
//! hashes. The one mutable store shared by every worker, so every write is
//! transactional and idempotent.

use crate::errors::StorageError;
use crate::types::collections::FxHashSet;

/// Research identifiers for one patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientIds {
    pub rid: String,
    /// Dense integer, unique per patient within this destination database,
    /// assigned sequentially and never reused.
    pub trid: i64,
    pub mrid: Option<String>,
}

pub trait AdminStore: Send + Sync {
    /// Look up or create the research IDs for a PID. Idempotent: calling
    /// twice returns the same IDs.
    fn get_or_create_rid(&self, pid: &str) -> Result<PatientIds, StorageError>;

    /// Record the master research ID for a PID. Idempotent for an equal
    /// MRID; a *different* MRID already on record is
    /// [`StorageError::MridMismatch`].
    fn set_mrid(&self, pid: &str, mrid: &str) -> Result<(), StorageError>;

    /// Whether the patient is withdrawn, across every opt-out source the
    /// store holds.
    fn opted_out(&self, pid: &str, mpid: Option<&str>) -> Result<bool, StorageError>;

    /// Record a PID opt-out. Append-only: the core never removes entries.
    fn record_opt_out_pid(&self, pid: &str) -> Result<(), StorageError>;

    /// Record an MPID opt-out. Append-only.
    fn record_opt_out_mpid(&self, mpid: &str) -> Result<(), StorageError>;

    fn store_row_hash(
        &self,
        dest_table: &str,
        dest_pk: &str,
        src_hash: &str,
    ) -> Result<(), StorageError>;

    fn get_row_hash(
        &self,
        dest_table: &str,
        dest_pk: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Drop stored row hashes for a table; with `keep`, only hashes whose
    /// PK is absent from the set are dropped. Returns the number removed.
    fn purge_row_hashes(
        &self,
        dest_table: &str,
        keep: Option<&FxHashSet<String>>,
    ) -> Result<usize, StorageError>;

    fn store_scrubber_digest(&self, pid: &str, digest: &str) -> Result<(), StorageError>;

    fn prior_scrubber_digest(&self, pid: &str) -> Result<Option<String>, StorageError>;

    /// Wipe everything, including the PID↔RID map. Only the full-run wipe
    /// switch calls this; research IDs are regenerated afterwards.
    fn wipe_all(&self) -> Result<(), StorageError>;
}
