//! Write access to the destination database, and the per-worker connection
//! factory.

use crate::errors::StorageError;
use crate::types::collections::FxHashSet;
use crate::types::value::Value;

use super::source::SourceDatabase;

/// Write access to the destination database. One handle per worker;
/// side effects are serialised within the worker that owns the handle.
pub trait DestinationDatabase {
    fn exec_ddl(&self, sql: &str) -> Result<(), StorageError>;

    /// Insert a batch of rows in a single transaction.
    fn write_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<(), StorageError>;

    /// Delete rows where `column = value`; returns the number deleted.
    fn delete_rows_eq(
        &mut self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<usize, StorageError>;

    /// Delete rows whose `pk_column` (rendered as text) is absent from
    /// `keep`; returns the number deleted. Used to drop destination rows
    /// whose source row vanished.
    fn delete_pks_not_in(
        &mut self,
        table: &str,
        pk_column: &str,
        keep: &FxHashSet<String>,
    ) -> Result<usize, StorageError>;

    fn table_exists(&self, table: &str) -> Result<bool, StorageError>;

    /// Column names of an existing table, in declaration order.
    fn existing_columns(&self, table: &str) -> Result<Vec<String>, StorageError>;
}

/// Per-worker connection factory. The only thing workers share.
pub trait Databases: Send + Sync {
    fn open_source(&self, tag: &str) -> Result<Box<dyn SourceDatabase>, StorageError>;
    fn open_destination(&self) -> Result<Box<dyn DestinationDatabase>, StorageError>;
}
