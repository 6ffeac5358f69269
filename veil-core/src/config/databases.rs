//! Database locations for a run.

use serde::{Deserialize, Serialize};

/// One source database, addressed everywhere by its tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDbConfig {
    /// Short identifier used in the data dictionary's `src_db` column.
    pub tag: String,
    /// Backend-specific locator (for the SQLite backend, a file path).
    pub path: String,
}

/// Source, destination, and admin database locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub source_databases: Vec<SourceDbConfig>,
    pub destination_database: String,
    pub admin_database: String,
}

impl DatabaseConfig {
    pub fn source_tags(&self) -> impl Iterator<Item = &str> {
        self.source_databases.iter().map(|db| db.tag.as_str())
    }

    pub fn source_path(&self, tag: &str) -> Option<&str> {
        self.source_databases
            .iter()
            .find(|db| db.tag == tag)
            .map(|db| db.path.as_str())
    }
}
