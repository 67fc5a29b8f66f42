//! Property graph of OCA schemas
//!
//! - `model`: shared result types
//! - `cypher`: Cypher statements and the read-only query guard
//! - `store`: the `GraphStore` trait
//! - `neo4j`: Neo4j over HTTP
//! - `sqlite`: embedded SQLite graph

pub mod cypher;
pub mod model;
pub mod neo4j;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::storage::Database;

pub use cypher::{Statement, ensure_read_only, import_statements};
pub use model::{BackendKind, GraphStats, ImportOutcome, ImportRunSummary, QueryResult};
pub use neo4j::Neo4jStore;
pub use sqlite::SqliteGraphStore;
pub use store::GraphStore;

/// Open the configured graph store
///
/// `backend` overrides `graph.backend` from the config.
pub async fn open_store(
    config: &Config,
    backend: Option<BackendKind>,
) -> anyhow::Result<Arc<dyn GraphStore>> {
    let backend = backend.unwrap_or(config.graph.backend);

    match backend {
        BackendKind::Neo4j => {
            let store = Neo4jStore::new(&config.neo4j)?;
            info!(endpoint = %store.endpoint(), "Using Neo4j graph store");
            Ok(Arc::new(store))
        }
        BackendKind::Sqlite => {
            let path = config.graph.resolved_sqlite_path();
            let db = Database::open(&path)
                .await
                .with_context(|| format!("Failed to open graph database at {}", path.display()))?;
            info!(path = %path.display(), "Using SQLite graph store");
            Ok(Arc::new(SqliteGraphStore::new(db.pool().clone())))
        }
    }
}
