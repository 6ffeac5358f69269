//! Bounded per-run cache of destination-table introspection.

use std::sync::Arc;

use moka::sync::Cache;

use veil_core::errors::StorageError;
use veil_core::traits::destination::DestinationDatabase;

/// Destination column lists, cached per table. Owned by the orchestrator for
/// the duration of one run; the bound keeps a pathological dictionary from
/// growing it without limit.
pub struct IntrospectionCache {
    columns: Cache<String, Arc<Vec<String>>>,
}

impl IntrospectionCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            columns: Cache::new(capacity),
        }
    }

    /// Column names of a destination table, introspecting on first use.
    pub fn columns(
        &self,
        dest: &dyn DestinationDatabase,
        table: &str,
    ) -> Result<Arc<Vec<String>>, StorageError> {
        if let Some(cached) = self.columns.get(table) {
            return Ok(cached);
        }
        let columns = Arc::new(dest.existing_columns(table)?);
        self.columns.insert(table.to_string(), Arc::clone(&columns));
        Ok(columns)
    }

    /// Drop cached entries (after DDL changes).
    pub fn invalidate(&self, table: &str) {
        self.columns.invalidate(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use veil_core::types::value::Value;
    use veil_core::FxHashSet;

    struct FakeDest {
        calls: AtomicUsize,
    }

    impl DestinationDatabase for FakeDest {
        fn exec_ddl(&self, _sql: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn write_rows(
            &mut self,
            _table: &str,
            _columns: &[String],
            _rows: &[Vec<Value>],
        ) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete_rows_eq(
            &mut self,
            _table: &str,
            _column: &str,
            _value: &Value,
        ) -> Result<usize, StorageError> {
            Ok(0)
        }
        fn delete_pks_not_in(
            &mut self,
            _table: &str,
            _pk_column: &str,
            _keep: &FxHashSet<String>,
        ) -> Result<usize, StorageError> {
            Ok(0)
        }
        fn table_exists(&self, _table: &str) -> Result<bool, StorageError> {
            Ok(true)
        }
        fn existing_columns(&self, _table: &str) -> Result<Vec<String>, StorageError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(vec!["a".to_string(), "b".to_string()])
        }
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let cache = IntrospectionCache::new(16);
        let dest = FakeDest {
            calls: AtomicUsize::new(0),
        };
        let first = cache.columns(&dest, "t").unwrap();
        let second = cache.columns(&dest, "t").unwrap();
        assert_eq!(first, second);
        assert_eq!(dest.calls.load(Ordering::Relaxed), 1);

        cache.invalidate("t");
        cache.columns(&dest, "t").unwrap();
        assert_eq!(dest.calls.load(Ordering::Relaxed), 2);
    }
}
