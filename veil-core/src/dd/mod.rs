//! The data dictionary: the declarative schema driving every per-column
//! decision.
//!
//! Loading proceeds in three phases: parse rows into [`ColumnSpec`]s
//! (unknown tokens fail loudly), validate the invariants, then build the
//! lookup indices. The loaded dictionary is immutable for the run.

mod column_spec;
mod dictionary;
mod parse;
mod validate;

pub use column_spec::ColumnSpec;
pub use dictionary::DataDictionary;
