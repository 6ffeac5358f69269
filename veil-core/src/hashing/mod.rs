//! Keyed one-way hashers.
//!
//! Three independently keyed instances drive the run: PID→RID, MPID→MRID,
//! and row-content change detection. Extra named hashers back `hash=tag`
//! alter methods. Output is lowercase hex of fixed width; the width doubles
//! as the destination column width for every research-ID and hash column.

use hmac::{Hmac, Mac};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::errors::ConfigError;
use crate::types::collections::FxHashMap;
use crate::types::value::Value;

/// Supported keyed hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    HmacMd5,
    HmacSha256,
    HmacSha512,
}

impl HashAlgorithm {
    /// Hex digest length in characters.
    pub fn digest_len(self) -> usize {
        match self {
            Self::HmacMd5 => 32,
            Self::HmacSha256 => 64,
            Self::HmacSha512 => 128,
        }
    }
}

/// A pure keyed hash function: `hash(text) -> fixed-width lowercase hex`.
#[derive(Clone)]
pub struct KeyedHasher {
    algorithm: HashAlgorithm,
    key: Vec<u8>,
}

impl KeyedHasher {
    /// Build a hasher. An empty key is fatal: an unkeyed digest would be
    /// reversible by dictionary attack over the PID space.
    pub fn new(purpose: &str, algorithm: HashAlgorithm, key: &str) -> Result<Self, ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::HasherKeyMissing {
                purpose: purpose.to_string(),
            });
        }
        Ok(Self {
            algorithm,
            key: key.as_bytes().to_vec(),
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hex digest length of every output of this hasher.
    pub fn digest_len(&self) -> usize {
        self.algorithm.digest_len()
    }

    /// Hash a string to lowercase hex.
    pub fn hash(&self, text: &str) -> String {
        match self.algorithm {
            HashAlgorithm::HmacMd5 => {
                let mut mac = Hmac::<Md5>::new_from_slice(&self.key)
                    .expect("HMAC accepts keys of any length");
                mac.update(text.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            HashAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
                    .expect("HMAC accepts keys of any length");
                mac.update(text.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            HashAlgorithm::HmacSha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(&self.key)
                    .expect("HMAC accepts keys of any length");
                mac.update(text.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}

impl std::fmt::Debug for KeyedHasher {
    // Never print the key.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedHasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The full set of hashers for a run.
#[derive(Debug, Clone)]
pub struct HasherSet {
    /// PID → RID.
    pub pid: KeyedHasher,
    /// MPID → MRID.
    pub mpid: KeyedHasher,
    /// Row-content change detection and scrubber digests.
    pub rows: KeyedHasher,
    extras: FxHashMap<String, KeyedHasher>,
}

impl HasherSet {
    pub fn new(
        pid: KeyedHasher,
        mpid: KeyedHasher,
        rows: KeyedHasher,
        extras: FxHashMap<String, KeyedHasher>,
    ) -> Self {
        Self {
            pid,
            mpid,
            rows,
            extras,
        }
    }

    /// Look up an extra hasher declared for a `hash=tag` alter method.
    pub fn extra(&self, tag: &str) -> Option<&KeyedHasher> {
        self.extras.get(tag)
    }
}

/// Keyed fingerprint over the canonical rendering of one row's fields.
/// Field order must be the dictionary order of the contributing columns so
/// that the same row always fingerprints identically.
pub fn row_fingerprint<'a>(
    hasher: &KeyedHasher,
    fields: impl Iterator<Item = &'a Value>,
) -> String {
    let mut material = String::new();
    for value in fields {
        material.push_str(&value.canonical());
        material.push('\x1f');
    }
    hasher.hash(&material)
}
