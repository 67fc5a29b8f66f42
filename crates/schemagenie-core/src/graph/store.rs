//! Graph store trait
//!
//! Abstracts over the Neo4j and SQLite backends. Both keep the same graph
//! shape, so importer, catalog and chat code never branch on the backend.

use async_trait::async_trait;

use crate::catalog::{AttributeMatch, SchemaDetail, SchemaSummary};
use crate::error::{Error, Result};
use crate::oca::SchemaRecord;

use super::model::{BackendKind, GraphStats, ImportOutcome, ImportRunSummary, QueryResult};

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend this store talks to
    fn backend(&self) -> BackendKind;

    /// Verify the store is reachable
    async fn health_check(&self) -> Result<()>;

    /// Write one schema with its attributes, metas and ordering
    ///
    /// Either everything for the schema is written or nothing is.
    async fn import_schema(&self, record: &SchemaRecord) -> Result<ImportOutcome>;

    /// All schemas, sorted by name
    async fn list_schemas(&self) -> Result<Vec<SchemaSummary>>;

    /// Look up a schema by id, falling back to name
    async fn get_schema(&self, key: &str) -> Result<Option<SchemaDetail>>;

    /// Case-insensitive substring search over attribute names and descriptions
    async fn search_attributes(&self, keyword: &str, limit: usize) -> Result<Vec<AttributeMatch>>;

    /// Schemas that declare the named attribute
    async fn schemas_sharing_attribute(&self, name: &str) -> Result<Vec<SchemaSummary>>;

    /// Node and relationship counts
    async fn stats(&self) -> Result<GraphStats>;

    /// Whether `run_read_query` is available
    fn supports_cypher(&self) -> bool {
        false
    }

    /// Run a read-only Cypher query
    async fn run_read_query(&self, _query: &str) -> Result<QueryResult> {
        Err(Error::Unsupported(
            self.backend().to_string(),
            "Cypher queries".to_string(),
        ))
    }

    /// Persist an import run summary
    async fn record_import_run(&self, _run: &ImportRunSummary) -> Result<()> {
        Ok(())
    }

    /// Most recent import run, if the backend keeps history
    async fn last_import_run(&self) -> Result<Option<ImportRunSummary>> {
        Ok(None)
    }
}

/// Normalize a user keyword for attribute search
pub(crate) fn normalize_keyword(keyword: &str) -> Result<String> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Err(Error::InvalidInput("search keyword must not be empty".to_string()));
    }
    Ok(keyword)
}
