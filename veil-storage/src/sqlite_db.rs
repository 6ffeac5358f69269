//! Reference SQLite implementations of the source and destination database
//! traits. Each worker opens its own handles through [`SqliteDatabases`];
//! sources are opened read-only.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use veil_core::config::DatabaseConfig;
use veil_core::errors::StorageError;
use veil_core::traits::destination::{Databases, DestinationDatabase};
use veil_core::traits::source::{RowFilter, SourceDatabase, SourceRow};
use veil_core::{FxHashMap, FxHashSet, Value};

use crate::connection::sqe;

/// Rows fetched per chunk when streaming a source table.
const FETCH_CHUNK: usize = 1_024;

/// Quote an identifier from the data dictionary for SQL interpolation.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn from_sql(value: rusqlite::types::ValueRef<'_>) -> Result<Value, StorageError> {
    use rusqlite::types::ValueRef;
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

/// Per-worker connection factory over SQLite files.
pub struct SqliteDatabases {
    sources: FxHashMap<String, PathBuf>,
    destination: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDatabases {
    pub fn new(config: &DatabaseConfig, busy_timeout: Duration) -> Self {
        let sources = config
            .source_databases
            .iter()
            .map(|db| (db.tag.clone(), PathBuf::from(&db.path)))
            .collect();
        Self {
            sources,
            destination: PathBuf::from(&config.destination_database),
            busy_timeout,
        }
    }
}

impl Databases for SqliteDatabases {
    fn open_source(&self, tag: &str) -> Result<Box<dyn SourceDatabase>, StorageError> {
        let path = self
            .sources
            .get(tag)
            .ok_or_else(|| StorageError::UnknownSource {
                tag: tag.to_string(),
            })?;
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sqe)?;
        conn.busy_timeout(self.busy_timeout).map_err(sqe)?;
        Ok(Box::new(SqliteSourceDb {
            tag: tag.to_string(),
            conn,
        }))
    }

    fn open_destination(&self) -> Result<Box<dyn DestinationDatabase>, StorageError> {
        let conn = Connection::open(&self.destination).map_err(sqe)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sqe)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(sqe)?;
        conn.busy_timeout(self.busy_timeout).map_err(sqe)?;
        Ok(Box::new(SqliteDestinationDb { conn }))
    }
}

// ─── Source ────────────────────────────────────────────────────────────────

pub struct SqliteSourceDb {
    tag: String,
    conn: Connection,
}

impl SourceDatabase for SqliteSourceDb {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn fetch_rows<'a>(
        &'a self,
        table: &str,
        columns: &[String],
        filter: RowFilter<'_>,
    ) -> Result<Box<dyn Iterator<Item = Result<SourceRow, StorageError>> + 'a>, StorageError>
    {
        let projection: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let (where_clause, params) = match filter {
            RowFilter::All => (String::new(), Vec::new()),
            RowFilter::Eq(column, value) => (
                format!("{} = ? AND ", quote_ident(column)),
                vec![to_sql(value)],
            ),
            RowFilter::PkRange(column, low, high) => (
                format!("{} BETWEEN ? AND ? AND ", quote_ident(column)),
                vec![
                    rusqlite::types::Value::Integer(low),
                    rusqlite::types::Value::Integer(high),
                ],
            ),
        };
        // Keyset pagination on rowid keeps memory flat without holding a
        // statement open across the whole table.
        let sql = format!(
            "SELECT rowid, {} FROM {} WHERE {}rowid > ? ORDER BY rowid LIMIT {}",
            projection.join(", "),
            quote_ident(table),
            where_clause,
            FETCH_CHUNK,
        );
        Ok(Box::new(ChunkedRows {
            conn: &self.conn,
            sql,
            params,
            column_count: columns.len(),
            last_rowid: i64::MIN,
            buffer: VecDeque::new(),
            done: false,
        }))
    }

    fn distinct_nonnull_values(
        &self,
        table: &str,
        column: &str,
        pid_column: &str,
        pid: &Value,
    ) -> Result<Vec<Value>, StorageError> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {pid_col} = ? AND {col} IS NOT NULL \
             ORDER BY 1",
            col = quote_ident(column),
            table = quote_ident(table),
            pid_col = quote_ident(pid_column),
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(sqe)?;
        let rows = stmt
            .query_map([to_sql(pid)], |row| Ok(row.get_ref(0)?.into()))
            .map_err(sqe)?;
        collect_values(rows)
    }

    fn distinct_pids(
        &self,
        table: &str,
        pid_column: &str,
    ) -> Result<Vec<Value>, StorageError> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY 1",
            col = quote_ident(pid_column),
            table = quote_ident(table),
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(sqe)?;
        let rows = stmt
            .query_map([], |row| Ok(row.get_ref(0)?.into()))
            .map_err(sqe)?;
        collect_values(rows)
    }

    fn integer_pk_range(
        &self,
        table: &str,
        pk_column: &str,
    ) -> Result<Option<(i64, i64)>, StorageError> {
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {table}",
            col = quote_ident(pk_column),
            table = quote_ident(table),
        );
        let range = self
            .conn
            .query_row(&sql, [], |row| {
                let min: rusqlite::types::Value = row.get(0)?;
                let max: rusqlite::types::Value = row.get(1)?;
                Ok((min, max))
            })
            .map_err(sqe)?;
        match range {
            (rusqlite::types::Value::Integer(min), rusqlite::types::Value::Integer(max)) => {
                Ok(Some((min, max)))
            }
            _ => Ok(None),
        }
    }
}

fn collect_values(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<rusqlite::types::Value>>,
) -> Result<Vec<Value>, StorageError> {
    let mut values = Vec::new();
    for row in rows {
        let owned = row.map_err(sqe)?;
        values.push(from_sql(rusqlite::types::ValueRef::from(&owned))?);
    }
    Ok(values)
}

struct ChunkedRows<'a> {
    conn: &'a Connection,
    sql: String,
    params: Vec<rusqlite::types::Value>,
    column_count: usize,
    last_rowid: i64,
    buffer: VecDeque<SourceRow>,
    done: bool,
}

impl ChunkedRows<'_> {
    fn refill(&mut self) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare_cached(&self.sql).map_err(sqe)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(self.params.len() + 1);
        for param in &self.params {
            bound.push(param);
        }
        bound.push(&self.last_rowid);

        let column_count = self.column_count;
        let mut rows = stmt.query(bound.as_slice()).map_err(sqe)?;
        let mut fetched = 0usize;
        while let Some(row) = rows.next().map_err(sqe)? {
            let rowid: i64 = row.get(0).map_err(sqe)?;
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(from_sql(row.get_ref(i + 1).map_err(sqe)?)?);
            }
            self.last_rowid = rowid;
            self.buffer.push_back(SourceRow { values });
            fetched += 1;
        }
        if fetched < FETCH_CHUNK {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for ChunkedRows<'_> {
    type Item = Result<SourceRow, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

// ─── Destination ───────────────────────────────────────────────────────────

pub struct SqliteDestinationDb {
    conn: Connection,
}

impl DestinationDatabase for SqliteDestinationDb {
    fn exec_ddl(&self, sql: &str) -> Result<(), StorageError> {
        self.conn.execute_batch(sql).map_err(sqe)
    }

    fn write_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", "),
        );
        let tx = self.conn.transaction().map_err(sqe)?;
        {
            let mut stmt = tx.prepare_cached(&sql).map_err(sqe)?;
            for row in rows {
                let params: Vec<rusqlite::types::Value> = row.iter().map(to_sql).collect();
                stmt.execute(rusqlite::params_from_iter(params)).map_err(sqe)?;
            }
        }
        tx.commit().map_err(sqe)
    }

    fn delete_rows_eq(
        &mut self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(column),
        );
        self.conn.execute(&sql, [to_sql(value)]).map_err(sqe)
    }

    fn delete_pks_not_in(
        &mut self,
        table: &str,
        pk_column: &str,
        keep: &FxHashSet<String>,
    ) -> Result<usize, StorageError> {
        let select = format!(
            "SELECT {} FROM {}",
            quote_ident(pk_column),
            quote_ident(table),
        );
        let doomed: Vec<rusqlite::types::Value> = {
            let mut stmt = self.conn.prepare(&select).map_err(sqe)?;
            let mut rows = stmt.query([]).map_err(sqe)?;
            let mut doomed = Vec::new();
            while let Some(row) = rows.next().map_err(sqe)? {
                let value = from_sql(row.get_ref(0).map_err(sqe)?)?;
                let key = value.as_text().unwrap_or_default();
                if !keep.contains(&key) {
                    doomed.push(to_sql(&value));
                }
            }
            doomed
        };
        if doomed.is_empty() {
            return Ok(0);
        }

        let delete = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(pk_column),
        );
        let tx = self.conn.transaction().map_err(sqe)?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached(&delete).map_err(sqe)?;
            for pk in doomed {
                removed += stmt.execute([pk]).map_err(sqe)?;
            }
        }
        tx.commit().map_err(sqe)?;
        Ok(removed)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(sqe)?;
        Ok(count > 0)
    }

    fn existing_columns(&self, table: &str) -> Result<Vec<String>, StorageError> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql).map_err(sqe)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(sqe)?
            .collect::<Result<_, _>>()
            .map_err(sqe)?;
        Ok(names)
    }
}
