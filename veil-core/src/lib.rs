//! # veil-core
//!
//! Foundation crate for the veil de-identification engine.
//! Defines the column-level type system, errors, configuration, the data
//! dictionary, keyed hashers, run events, and the traits implemented by the
//! storage and engine crates. Every other crate in the workspace depends on
//! this.

pub mod config;
pub mod constants;
pub mod dd;
pub mod errors;
pub mod events;
pub mod hashing;
pub mod tracing;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::VeilConfig;
pub use dd::{ColumnSpec, DataDictionary};
pub use errors::error_code::VeilErrorCode;
pub use events::{NullEventHandler, RunEventHandler, RunSummary};
pub use hashing::{HashAlgorithm, HasherSet, KeyedHasher};
pub use types::collections::{FxHashMap, FxHashSet};
pub use types::value::Value;
