//! Storage layer - SQLite
//!
//! Connection pool management and migrations backing the embedded graph store.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! # Usage
//!
//! ```ignore
//! use schemagenie_core::storage::Database;
//!
//! let db = Database::in_memory().await?;
//! let store = SqliteGraphStore::new(db.pool().clone());
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
