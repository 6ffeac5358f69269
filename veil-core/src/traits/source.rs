//! Read access to one source database.

use crate::errors::StorageError;
use crate::types::value::Value;

/// One fetched row; values align with the column list passed to
/// [`SourceDatabase::fetch_rows`].
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub values: Vec<Value>,
}

/// Server-side row filter for a fetch.
#[derive(Debug, Clone)]
pub enum RowFilter<'a> {
    All,
    /// `column = value`.
    Eq(&'a str, &'a Value),
    /// `pk_column BETWEEN low AND high` (inclusive).
    PkRange(&'a str, i64, i64),
}

/// Read-only, streaming access to one source database.
///
/// Implementations must stream: a worker never buffers an entire table.
pub trait SourceDatabase {
    fn tag(&self) -> &str;

    /// Fetch rows of `table`, projected to `columns`, optionally filtered.
    /// The iterator borrows the connection; drive it to completion before
    /// issuing another fetch on the same handle.
    fn fetch_rows<'a>(
        &'a self,
        table: &str,
        columns: &[String],
        filter: RowFilter<'_>,
    ) -> Result<Box<dyn Iterator<Item = Result<SourceRow, StorageError>> + 'a>, StorageError>;

    /// Distinct non-null values of `column` over the rows where
    /// `pid_column = pid`.
    fn distinct_nonnull_values(
        &self,
        table: &str,
        column: &str,
        pid_column: &str,
        pid: &Value,
    ) -> Result<Vec<Value>, StorageError>;

    /// Distinct non-null values of the PID column over the whole table.
    fn distinct_pids(&self, table: &str, pid_column: &str)
        -> Result<Vec<Value>, StorageError>;

    /// `(min, max)` of an integer PK, or `None` for an empty table or a
    /// non-integer key.
    fn integer_pk_range(
        &self,
        table: &str,
        pk_column: &str,
    ) -> Result<Option<(i64, i64)>, StorageError>;
}
