// syncq Infrastructure - SQLite Adapter
// Implements: KeyValueStore, DeadLetterStore, Maintenance

mod connection;
mod dead_letter;
mod error;
mod kv_store;
mod maintenance_impl;
mod migration;

pub use connection::create_pool;
pub use dead_letter::SqliteDeadLetterStore;
pub use kv_store::SqliteKeyValueStore;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;

// Note: sqlx::Error conversion goes through error::map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
