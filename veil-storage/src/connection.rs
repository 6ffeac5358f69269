//! Connection management for the admin database.
//!
//! One write connection behind a mutex; the admin workload (identifier
//! lookups, hash reads/writes) is small compared with destination writes, so
//! serialised access is not a bottleneck. Pragmas: WAL on file-backed
//! databases, foreign keys on, busy timeout applied.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use veil_core::errors::StorageError;

use crate::migrations;

/// Map a rusqlite error to a `StorageError`, classifying busy states.
pub fn sqe(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(code, _) => match code.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                StorageError::Busy
            }
            rusqlite::ErrorCode::ConstraintViolation => StorageError::Constraint {
                message: e.to_string(),
            },
            rusqlite::ErrorCode::DatabaseCorrupt => StorageError::Corrupt {
                details: e.to_string(),
            },
            _ => StorageError::Sqlite {
                message: e.to_string(),
            },
        },
        _ => StorageError::Sqlite {
            message: e.to_string(),
        },
    }
}

/// Owner of the admin database connection.
pub struct DatabaseManager {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl DatabaseManager {
    /// Open (creating if necessary) a file-backed admin database, apply
    /// pragmas, and run migrations.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(sqe)?;
        apply_pragmas(&conn, busy_timeout, true)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory admin database (for tests).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(sqe)?;
        apply_pragmas(&conn, Duration::from_millis(100), false)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection. All reads and writes go through
    /// here; the mutex serialises cross-worker access.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self.conn.lock().expect("admin connection mutex poisoned");
        f(&conn)
    }

    /// Like [`Self::with_conn`] but with a mutable borrow, for transactions.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn.lock().expect("admin connection mutex poisoned");
        f(&mut conn)
    }
}

fn apply_pragmas(
    conn: &Connection,
    busy_timeout: Duration,
    file_backed: bool,
) -> Result<(), StorageError> {
    if file_backed {
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sqe)?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(sqe)?;
    conn.pragma_update(None, "foreign_keys", "ON").map_err(sqe)?;
    conn.busy_timeout(busy_timeout).map_err(sqe)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_runs_migrations() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let version = db
            .with_conn(|conn| migrations::current_version(conn))
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
    }

    #[test]
    fn file_backed_open_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.db");
        {
            let db = DatabaseManager::open(&path, Duration::from_millis(100)).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO opt_out_pid (pid) VALUES ('p1')",
                    [],
                )
                .map_err(sqe)?;
                Ok(())
            })
            .unwrap();
        }
        let db = DatabaseManager::open(&path, Duration::from_millis(100)).unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM opt_out_pid", [], |row| row.get(0))
                    .map_err(sqe)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
