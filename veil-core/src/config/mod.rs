//! Run configuration.
//!
//! A single immutable `VeilConfig` is constructed at startup (from TOML) and
//! passed explicitly to every component; there are no globals. Optional
//! fields default through `effective_*()` accessors so a minimal config file
//! stays minimal.

mod databases;
mod hashers;
mod optout;
mod run_options;
mod scrub_options;

pub use databases::{DatabaseConfig, SourceDbConfig};
pub use hashers::{HasherSpec, HashersConfig};
pub use optout::OptOutOptions;
pub use run_options::RunOptions;
pub use scrub_options::ScrubOptions;

use serde::{Deserialize, Serialize};

use crate::constants::ALLOWED_DATE_BLUR_DIRECTIVES;
use crate::errors::ConfigError;
use crate::hashing::HasherSet;

/// Top-level configuration for one anonymisation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilConfig {
    pub databases: DatabaseConfig,
    pub hashers: HashersConfig,
    #[serde(default)]
    pub scrub: ScrubOptions,
    #[serde(default)]
    pub optout: OptOutOptions,
    #[serde(default)]
    pub run: RunOptions,
}

impl VeilConfig {
    /// Parse and validate a TOML configuration string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML configuration file.
    pub fn from_toml_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Startup validation. Everything here is fatal before any row is read.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.effective_workers() == 0 {
            return Err(ConfigError::InvalidOption {
                option: "run.workers".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        if self.databases.source_databases.is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "databases.source_databases".to_string(),
                message: "at least one source database is required".to_string(),
            });
        }
        if let Some(template) = &self.scrub.replace_all_dates_with {
            validate_date_blur_template(template)?;
        }
        // Building the hashers checks every key for presence.
        self.hashers.build()?;
        Ok(())
    }

    /// Instantiate the keyed hashers declared by this config.
    pub fn build_hashers(&self) -> Result<HasherSet, ConfigError> {
        self.hashers.build()
    }
}

/// Reject any strftime directive outside the blur-safe set. Day-of-month
/// directives would leak the very information blurring is meant to remove.
fn validate_date_blur_template(template: &str) -> Result<(), ConfigError> {
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            continue;
        }
        let directive = match chars.next() {
            Some(next) => format!("%{next}"),
            None => "%".to_string(),
        };
        if !ALLOWED_DATE_BLUR_DIRECTIVES.contains(&directive.as_str()) {
            return Err(ConfigError::BadDateDirective { directive });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_template_accepts_month_year() {
        assert!(validate_date_blur_template("[%b %Y]").is_ok());
        assert!(validate_date_blur_template("%m/%y").is_ok());
    }

    #[test]
    fn blur_template_rejects_day_directives() {
        assert!(validate_date_blur_template("%d %b %Y").is_err());
        assert!(validate_date_blur_template("%e").is_err());
        assert!(validate_date_blur_template("trailing %").is_err());
    }

    #[test]
    fn minimal_toml_round_trip() {
        let toml = r#"
            [databases]
            destination_database = "dest.db"
            admin_database = "admin.db"

            [[databases.source_databases]]
            tag = "ephr"
            path = "src.db"

            [hashers.pid]
            algorithm = "hmac_sha256"
            key = "k1"

            [hashers.mpid]
            algorithm = "hmac_sha256"
            key = "k2"

            [hashers.rows]
            algorithm = "hmac_md5"
            key = "k3"
        "#;
        let config = VeilConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.databases.source_databases[0].tag, "ephr");
        assert_eq!(config.run.effective_max_rows_before_commit(), 1_000);
        assert_eq!(config.scrub.effective_replace_patient_with(), "[__PPP__]");
    }

    #[test]
    fn zero_workers_rejected() {
        let toml = r#"
            [databases]
            destination_database = "dest.db"
            admin_database = "admin.db"

            [[databases.source_databases]]
            tag = "ephr"
            path = "src.db"

            [hashers.pid]
            algorithm = "hmac_sha256"
            key = "k1"

            [hashers.mpid]
            algorithm = "hmac_sha256"
            key = "k2"

            [hashers.rows]
            algorithm = "hmac_md5"
            key = "k3"

            [run]
            workers = 0
        "#;
        assert!(VeilConfig::from_toml_str(toml).is_err());
    }
}
