//! `AdminStoreEngine` — the concrete identifier store over SQLite.
//!
//! Implements `veil_core::traits::AdminStore` on top of the query modules.
//! Owns the PID hasher so `get_or_create_rid` can mint research IDs itself;
//! everything else takes already-hashed identifiers.

use std::path::Path;
use std::time::Duration;

use veil_core::errors::StorageError;
use veil_core::hashing::KeyedHasher;
use veil_core::traits::admin::{AdminStore, PatientIds};
use veil_core::FxHashSet;

use crate::connection::{sqe, DatabaseManager};
use crate::queries;

/// Attempts at claiming a TRID before giving up; conflicts only happen when
/// another worker process allocates concurrently.
const TRID_ALLOCATION_ATTEMPTS: usize = 10;

pub struct AdminStoreEngine {
    db: DatabaseManager,
    pid_hasher: KeyedHasher,
}

impl AdminStoreEngine {
    /// Open a file-backed admin store. Runs migrations.
    pub fn open(
        path: &Path,
        busy_timeout: Duration,
        pid_hasher: KeyedHasher,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            db: DatabaseManager::open(path, busy_timeout)?,
            pid_hasher,
        })
    }

    /// Open an in-memory admin store (for tests).
    pub fn open_in_memory(pid_hasher: KeyedHasher) -> Result<Self, StorageError> {
        Ok(Self {
            db: DatabaseManager::open_in_memory()?,
            pid_hasher,
        })
    }

    pub fn patient_count(&self) -> Result<i64, StorageError> {
        self.db.with_conn(queries::identifier_map::count)
    }
}

impl AdminStore for AdminStoreEngine {
    fn get_or_create_rid(&self, pid: &str) -> Result<PatientIds, StorageError> {
        if let Some(ids) = self.db.with_conn(|conn| queries::identifier_map::get(conn, pid))? {
            return Ok(ids);
        }
        let rid = self.pid_hasher.hash(pid);

        // Dense sequential TRID, serialised by the uniqueness constraint and
        // retried on conflict with a concurrent allocator.
        for _ in 0..TRID_ALLOCATION_ATTEMPTS {
            let result = self.db.with_conn(|conn| {
                queries::identifier_map::insert_with_next_trid(conn, pid, &rid)
            });
            match result {
                Ok(ids) => return Ok(ids),
                Err(StorageError::Constraint { .. }) => {
                    // Either the TRID was taken, or another worker inserted
                    // this PID; in the latter case the lookup now succeeds.
                    if let Some(ids) =
                        self.db.with_conn(|conn| queries::identifier_map::get(conn, pid))?
                    {
                        return Ok(ids);
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Err(StorageError::Constraint {
            message: "could not allocate a transient research ID".to_string(),
        })
    }

    fn set_mrid(&self, pid: &str, mrid: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            match queries::identifier_map::mrid_for(conn, pid)? {
                Some(existing) if existing == mrid => Ok(()),
                Some(_) => Err(StorageError::MridMismatch),
                None => queries::identifier_map::set_mrid(conn, pid, mrid),
            }
        })
    }

    fn opted_out(&self, pid: &str, mpid: Option<&str>) -> Result<bool, StorageError> {
        self.db.with_conn(|conn| {
            if queries::opt_out::pid_opted_out(conn, pid)? {
                return Ok(true);
            }
            match mpid {
                Some(mpid) => queries::opt_out::mpid_opted_out(conn, mpid),
                None => Ok(false),
            }
        })
    }

    fn record_opt_out_pid(&self, pid: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| queries::opt_out::record_pid(conn, pid))
    }

    fn record_opt_out_mpid(&self, mpid: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| queries::opt_out::record_mpid(conn, mpid))
    }

    fn store_row_hash(
        &self,
        dest_table: &str,
        dest_pk: &str,
        src_hash: &str,
    ) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| queries::row_hash::store(conn, dest_table, dest_pk, src_hash))
    }

    fn get_row_hash(
        &self,
        dest_table: &str,
        dest_pk: &str,
    ) -> Result<Option<String>, StorageError> {
        self.db
            .with_conn(|conn| queries::row_hash::get(conn, dest_table, dest_pk))
    }

    fn purge_row_hashes(
        &self,
        dest_table: &str,
        keep: Option<&FxHashSet<String>>,
    ) -> Result<usize, StorageError> {
        self.db
            .with_conn(|conn| queries::row_hash::purge(conn, dest_table, keep))
    }

    fn store_scrubber_digest(&self, pid: &str, digest: &str) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| queries::scrubber_hash::store(conn, pid, digest))
    }

    fn prior_scrubber_digest(&self, pid: &str) -> Result<Option<String>, StorageError> {
        self.db.with_conn(|conn| queries::scrubber_hash::get(conn, pid))
    }

    fn wipe_all(&self) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            conn.execute_batch(
                "DELETE FROM source_row_hash;
                 DELETE FROM patient_scrubber_hash;
                 DELETE FROM opt_out_pid;
                 DELETE FROM opt_out_mpid;
                 DELETE FROM pid_rid_map;",
            )
            .map_err(sqe)
        })
    }
}
