//! Hasher declarations: one keyed hasher per purpose, plus named extras
//! referenced by `hash=tag` alter methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::hashing::{HashAlgorithm, HasherSet, KeyedHasher};
use crate::types::collections::FxHashMap;

/// Algorithm + secret key for one hasher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherSpec {
    pub algorithm: HashAlgorithm,
    pub key: String,
}

impl HasherSpec {
    fn build(&self, purpose: &str) -> Result<KeyedHasher, ConfigError> {
        KeyedHasher::new(purpose, self.algorithm, &self.key)
    }
}

/// The three mandatory hashers and any named extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashersConfig {
    /// PID → RID.
    pub pid: HasherSpec,
    /// MPID → MRID.
    pub mpid: HasherSpec,
    /// Row fingerprints and scrubber digests.
    pub rows: HasherSpec,
    /// Extra hashers for `hash=tag` alter methods, keyed by tag.
    #[serde(default)]
    pub extras: BTreeMap<String, HasherSpec>,
}

impl HashersConfig {
    pub fn build(&self) -> Result<HasherSet, ConfigError> {
        let mut extras = FxHashMap::default();
        for (tag, spec) in &self.extras {
            extras.insert(tag.clone(), spec.build(tag)?);
        }
        Ok(HasherSet::new(
            self.pid.build("pid")?,
            self.mpid.build("mpid")?,
            self.rows.build("rows")?,
            extras,
        ))
    }
}
