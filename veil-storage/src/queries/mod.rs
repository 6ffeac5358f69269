//! Per-table query modules for the admin database.

pub mod identifier_map;
pub mod opt_out;
pub mod row_hash;
pub mod scrubber_hash;
