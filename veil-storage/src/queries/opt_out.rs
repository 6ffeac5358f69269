//! Opt-out list queries. Append-only: nothing here deletes.

use rusqlite::{params, Connection};

use veil_core::errors::StorageError;

use crate::connection::sqe;

pub fn record_pid(conn: &Connection, pid: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO opt_out_pid (pid) VALUES (?1)",
        params![pid],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn record_mpid(conn: &Connection, mpid: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO opt_out_mpid (mpid) VALUES (?1)",
        params![mpid],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn pid_opted_out(conn: &Connection, pid: &str) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM opt_out_pid WHERE pid = ?1",
            params![pid],
            |row| row.get(0),
        )
        .map_err(sqe)?;
    Ok(count > 0)
}

pub fn mpid_opted_out(conn: &Connection, mpid: &str) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM opt_out_mpid WHERE mpid = ?1",
            params![mpid],
            |row| row.get(0),
        )
        .map_err(sqe)?;
    Ok(count > 0)
}
