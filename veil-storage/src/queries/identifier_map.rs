//! `pid_rid_map` queries: the reversible PID ↔ research-ID mapping.

use rusqlite::{params, Connection, OptionalExtension};

use veil_core::errors::StorageError;
use veil_core::traits::admin::PatientIds;

use crate::connection::sqe;

pub fn get(conn: &Connection, pid: &str) -> Result<Option<PatientIds>, StorageError> {
    conn.query_row(
        "SELECT rid, trid, mrid FROM pid_rid_map WHERE pid = ?1",
        params![pid],
        |row| {
            Ok(PatientIds {
                rid: row.get(0)?,
                trid: row.get(1)?,
                mrid: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(sqe)
}

/// Insert a new mapping with the next dense TRID. Raises a constraint error
/// if another writer takes the TRID first; the engine retries.
pub fn insert_with_next_trid(
    conn: &Connection,
    pid: &str,
    rid: &str,
) -> Result<PatientIds, StorageError> {
    let trid: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(trid), 0) + 1 FROM pid_rid_map",
            [],
            |row| row.get(0),
        )
        .map_err(sqe)?;
    conn.execute(
        "INSERT INTO pid_rid_map (pid, rid, mrid, trid) VALUES (?1, ?2, NULL, ?3)",
        params![pid, rid, trid],
    )
    .map_err(sqe)?;
    Ok(PatientIds {
        rid: rid.to_string(),
        trid,
        mrid: None,
    })
}

pub fn mrid_for(conn: &Connection, pid: &str) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT mrid FROM pid_rid_map WHERE pid = ?1",
        params![pid],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map_err(sqe)
    .map(Option::flatten)
}

pub fn set_mrid(conn: &Connection, pid: &str, mrid: &str) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE pid_rid_map SET mrid = ?2 WHERE pid = ?1",
        params![pid, mrid],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM pid_rid_map", [], |row| row.get(0))
        .map_err(sqe)
}
