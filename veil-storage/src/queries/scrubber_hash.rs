//! `patient_scrubber_hash` queries: change detection for per-patient
//! scrubbers.

use rusqlite::{params, Connection, OptionalExtension};

use veil_core::errors::StorageError;

use crate::connection::sqe;

pub fn store(conn: &Connection, pid: &str, digest: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO patient_scrubber_hash (pid, scrubber_digest)
         VALUES (?1, ?2)
         ON CONFLICT (pid) DO UPDATE SET scrubber_digest = excluded.scrubber_digest",
        params![pid, digest],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn get(conn: &Connection, pid: &str) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT scrubber_digest FROM patient_scrubber_hash WHERE pid = ?1",
        params![pid],
        |row| row.get(0),
    )
    .optional()
    .map_err(sqe)
}
