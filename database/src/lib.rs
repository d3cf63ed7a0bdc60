//! foreman-database: SQLite persistence for the coordination kernel.

pub mod common;
pub mod sqlite;

pub use sqlite::SqliteStore;
