//! # veil-storage
//!
//! SQLite persistence for the de-identification engine: the admin
//! (identifier) store behind [`AdminStoreEngine`], and the reference
//! [`SqliteDatabases`] implementation of the source/destination traits.

pub mod connection;
pub mod engine;
pub mod migrations;
pub mod queries;
pub mod sqlite_db;

pub use connection::DatabaseManager;
pub use engine::AdminStoreEngine;
pub use sqlite_db::SqliteDatabases;
