//! Admin-database schema migrations, tracked through `user_version`.
//! Idempotent: running against an up-to-date database is a no-op.

use rusqlite::Connection;

use veil_core::errors::StorageError;

use crate::connection::sqe;

pub const LATEST_VERSION: u32 = 1;

const V1: &str = "
CREATE TABLE IF NOT EXISTS pid_rid_map (
    pid  TEXT PRIMARY KEY NOT NULL,
    rid  TEXT NOT NULL,
    mrid TEXT,
    trid INTEGER UNIQUE NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pid_rid_map_rid ON pid_rid_map (rid);

CREATE TABLE IF NOT EXISTS opt_out_pid (
    pid TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS opt_out_mpid (
    mpid TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS patient_scrubber_hash (
    pid             TEXT PRIMARY KEY NOT NULL,
    scrubber_digest TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source_row_hash (
    dest_table TEXT NOT NULL,
    dest_pk    TEXT NOT NULL,
    src_hash   TEXT NOT NULL,
    PRIMARY KEY (dest_table, dest_pk)
);
";

pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(sqe)
}

pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let mut version = current_version(conn)?;
    while version < LATEST_VERSION {
        let next = version + 1;
        let sql = match next {
            1 => V1,
            _ => {
                return Err(StorageError::MigrationFailed {
                    version: next,
                    message: "no migration script registered".to_string(),
                })
            }
        };
        conn.execute_batch(sql)
            .map_err(|e| StorageError::MigrationFailed {
                version: next,
                message: e.to_string(),
            })?;
        conn.pragma_update(None, "user_version", next).map_err(sqe)?;
        tracing::debug!(version = next, "admin schema migrated");
        version = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn v1_creates_the_five_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
        let tables = table_names(&conn);
        for table in [
            "opt_out_mpid",
            "opt_out_pid",
            "patient_scrubber_hash",
            "pid_rid_map",
            "source_row_hash",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }
}
