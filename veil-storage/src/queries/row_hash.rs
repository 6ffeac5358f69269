//! `source_row_hash` queries: per-row change detection for hashed tables.

use rusqlite::{params, Connection, OptionalExtension};

use veil_core::errors::StorageError;
use veil_core::FxHashSet;

use crate::connection::sqe;

pub fn store(
    conn: &Connection,
    dest_table: &str,
    dest_pk: &str,
    src_hash: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO source_row_hash (dest_table, dest_pk, src_hash)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (dest_table, dest_pk) DO UPDATE SET src_hash = excluded.src_hash",
        params![dest_table, dest_pk, src_hash],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn get(
    conn: &Connection,
    dest_table: &str,
    dest_pk: &str,
) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT src_hash FROM source_row_hash WHERE dest_table = ?1 AND dest_pk = ?2",
        params![dest_table, dest_pk],
        |row| row.get(0),
    )
    .optional()
    .map_err(sqe)
}

/// Drop hashes for a table. With `keep`, only rows whose PK is absent from
/// the set are dropped. Returns the number removed.
pub fn purge(
    conn: &Connection,
    dest_table: &str,
    keep: Option<&FxHashSet<String>>,
) -> Result<usize, StorageError> {
    match keep {
        None => conn
            .execute(
                "DELETE FROM source_row_hash WHERE dest_table = ?1",
                params![dest_table],
            )
            .map_err(sqe),
        Some(keep) => {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT dest_pk FROM source_row_hash WHERE dest_table = ?1",
                )
                .map_err(sqe)?;
            let pks: Vec<String> = stmt
                .query_map(params![dest_table], |row| row.get(0))
                .map_err(sqe)?
                .collect::<Result<_, _>>()
                .map_err(sqe)?;

            let mut removed = 0;
            let mut delete = conn
                .prepare_cached(
                    "DELETE FROM source_row_hash WHERE dest_table = ?1 AND dest_pk = ?2",
                )
                .map_err(sqe)?;
            for pk in pks {
                if !keep.contains(&pk) {
                    removed += delete.execute(params![dest_table, pk]).map_err(sqe)?;
                }
            }
            Ok(removed)
        }
    }
}
