//! Neo4j graph store over the HTTP transactional Cypher endpoint
//!
//! Every call is one `POST {uri}/db/{database}/tx/commit`. Neo4j runs all
//! statements of a request in a single transaction, so a schema import
//! either lands completely or not at all.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::catalog::{AttributeMatch, AttributeView, SchemaDetail, SchemaSummary, StoredAttribute};
use crate::config::Neo4jConfig;
use crate::error::{Error, Result};
use crate::oca::{MetaRecord, Ordering, SchemaRecord};

use super::cypher::{self, Statement, ensure_read_only};
use super::model::{BackendKind, GraphStats, ImportOutcome, QueryResult};
use super::store::{GraphStore, normalize_keyword};

/// Request timeout for Cypher calls
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Neo4j store speaking the HTTP Cypher API
pub struct Neo4jStore {
    client: Client,
    endpoint: String,
    user: String,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Build the transactional commit endpoint for a database
fn commit_endpoint(uri: &str, database: &str) -> Result<String> {
    let uri = uri.trim().trim_end_matches('/');
    let scheme = uri.split("://").next().unwrap_or_default().to_lowercase();

    match scheme.as_str() {
        "http" | "https" => {}
        "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => {
            return Err(Error::ConfigError(format!(
                "{} uses the Bolt protocol; set neo4j.uri to the HTTP endpoint (e.g. http://localhost:7474)",
                uri
            )));
        }
        _ => {
            return Err(Error::ConfigError(format!(
                "Invalid Neo4j URI '{}': expected http:// or https://",
                uri
            )));
        }
    }

    if database.trim().is_empty() {
        return Err(Error::ConfigError("neo4j.database must not be empty".to_string()));
    }

    Ok(format!("{}/db/{}/tx/commit", uri, database.trim()))
}

/// Decode a transactional response body
fn parse_response(body: &str) -> Result<Vec<QueryResult>> {
    let response: TxResponse = serde_json::from_str(body).map_err(|e| {
        Error::GraphQuery("Response".to_string(), format!("unreadable Neo4j response: {}", e))
    })?;

    if let Some(err) = response.errors.into_iter().next() {
        return Err(Error::GraphQuery(err.code, err.message));
    }

    Ok(response
        .results
        .into_iter()
        .map(|result| QueryResult {
            columns: result.columns,
            rows: result.data.into_iter().map(|d| d.row).collect(),
        })
        .collect())
}

// ========== Row decoding ==========

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn count(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_u64).unwrap_or(0)
}

fn summary_from_row(row: &[Value]) -> SchemaSummary {
    SchemaSummary {
        id: text(row.first()).unwrap_or_default(),
        name: text(row.get(1)).unwrap_or_default(),
        schema_type: text(row.get(2)).unwrap_or_default(),
        attribute_count: count(row.get(3)),
        meta_count: count(row.get(4)),
    }
}

fn attribute_from_map(map: &Value) -> AttributeView {
    AttributeView::from(StoredAttribute {
        name: text(map.get("name")).unwrap_or_default(),
        attribute_type: text(map.get("type")),
        unit: text(map.get("unit")),
        description: text(map.get("description")),
        format: text(map.get("format")),
        vocabulary: text(map.get("vocabulary")),
        codes: text(map.get("codes")),
    })
}

fn meta_from_map(map: &Value) -> MetaRecord {
    MetaRecord {
        name: text(map.get("name")).unwrap_or_default(),
        description: text(map.get("description")),
        language: text(map.get("language")).unwrap_or_default(),
    }
}

/// Ordering properties may come back as a list or a JSON string
fn ordering_from_schema(schema: &Value) -> Option<Ordering> {
    let attribute_ordering: Vec<String> = match schema.get("attribute_ordering")? {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(raw) => serde_json::from_str(raw).ok()?,
        _ => return None,
    };

    let entry_code_ordering = match schema.get("entry_code_ordering") {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
        Some(Value::Object(map)) => map.clone(),
        _ => Default::default(),
    };

    Some(Ordering {
        attribute_ordering,
        entry_code_ordering,
    })
}

fn detail_from_row(row: &[Value]) -> Option<SchemaDetail> {
    let schema = row.first().filter(|v| v.is_object())?;

    let attributes = row
        .get(1)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(attribute_from_map).collect())
        .unwrap_or_default();

    let mut metas: Vec<MetaRecord> = row
        .get(2)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(meta_from_map).collect())
        .unwrap_or_default();
    metas.sort_by(|a, b| a.language.cmp(&b.language).then_with(|| a.name.cmp(&b.name)));

    let name = text(schema.get("name")).unwrap_or_default();
    let mut detail = SchemaDetail {
        id: text(schema.get("id")).unwrap_or_default(),
        display_name: text(schema.get("displayName")).unwrap_or_else(|| name.clone()),
        name,
        capture_base_id: text(schema.get("capture_base_id")),
        schema_type: text(schema.get("type")).unwrap_or_default(),
        attributes,
        metas,
        ordering: ordering_from_schema(schema),
    };
    detail.sort_attributes();
    Some(detail)
}

fn match_from_row(row: &[Value]) -> Option<AttributeMatch> {
    let attribute = row.first().filter(|v| v.is_object()).map(attribute_from_map)?;
    let mut schemas: Vec<String> = row
        .get(1)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    schemas.sort();
    Some(AttributeMatch { attribute, schemas })
}

impl Neo4jStore {
    /// Create a store from configuration
    ///
    /// Fails for Bolt URIs; only the HTTP endpoint is supported.
    pub fn new(config: &Neo4jConfig) -> Result<Self> {
        let endpoint = commit_endpoint(&config.uri, &config.database)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            user: config.user.clone(),
            password: config.resolved_password(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run statements in one transaction and return one result per statement
    pub async fn run(&self, statements: &[Statement]) -> Result<Vec<QueryResult>> {
        let body = json!({ "statements": statements });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.user, Some(password));
        }

        debug!(endpoint = %self.endpoint, statements = statements.len(), "Sending Cypher transaction");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => parse_response(&body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::ConfigError(format!(
                "Neo4j rejected the credentials for user '{}'. Check NEO4J_USER and NEO4J_PASSWORD.",
                self.user
            ))),
            StatusCode::NOT_FOUND => Err(Error::ConfigError(format!(
                "Neo4j endpoint not found: {}. Check neo4j.uri and neo4j.database.",
                self.endpoint
            ))),
            _ => {
                warn!(status = %status, "Neo4j request failed");
                Err(Error::GraphQuery(status.to_string(), body))
            }
        }
    }

    async fn run_one(&self, statement: Statement) -> Result<QueryResult> {
        Ok(self
            .run(std::slice::from_ref(&statement))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Neo4j
    }

    async fn health_check(&self) -> Result<()> {
        self.run_one(Statement::new(cypher::HEALTH_CHECK)).await?;
        Ok(())
    }

    async fn import_schema(&self, record: &SchemaRecord) -> Result<ImportOutcome> {
        let statements = cypher::import_statements(record);
        let results = self.run(&statements).await?;

        let created = results
            .first()
            .and_then(|r| r.rows.first())
            .and_then(|row| row.first())
            .and_then(Value::as_bool)
            .unwrap_or(false);

        debug!(schema_id = %record.id, created, "Schema written to Neo4j");
        Ok(ImportOutcome {
            schema_id: record.id.clone(),
            schema_name: record.name.clone(),
            created,
            attributes_written: record.attributes.len(),
            metas_written: record.metas.len(),
            ordering_written: record.ordering.is_some(),
        })
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaSummary>> {
        let result = self.run_one(Statement::new(cypher::LIST_SCHEMAS.trim())).await?;
        Ok(result.rows.iter().map(|row| summary_from_row(row)).collect())
    }

    async fn get_schema(&self, key: &str) -> Result<Option<SchemaDetail>> {
        let result = self
            .run_one(Statement::new(cypher::GET_SCHEMA.trim()).param("key", key))
            .await?;
        Ok(result.rows.first().and_then(|row| detail_from_row(row)))
    }

    async fn search_attributes(&self, keyword: &str, limit: usize) -> Result<Vec<AttributeMatch>> {
        let keyword = normalize_keyword(keyword)?;
        let result = self
            .run_one(
                Statement::new(cypher::SEARCH_ATTRIBUTES.trim())
                    .param("keyword", keyword)
                    .param("limit", limit as u64),
            )
            .await?;
        Ok(result.rows.iter().filter_map(|row| match_from_row(row)).collect())
    }

    async fn schemas_sharing_attribute(&self, name: &str) -> Result<Vec<SchemaSummary>> {
        let result = self
            .run_one(Statement::new(cypher::SCHEMAS_SHARING_ATTRIBUTE.trim()).param("name", name))
            .await?;
        Ok(result.rows.iter().map(|row| summary_from_row(row)).collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let result = self.run_one(Statement::new(cypher::GRAPH_STATS.trim())).await?;
        let row = result.rows.first().cloned().unwrap_or_default();
        Ok(GraphStats {
            schemas: count(row.first()),
            attributes: count(row.get(1)),
            metas: count(row.get(2)),
            relationships: count(row.get(3)),
        })
    }

    fn supports_cypher(&self) -> bool {
        true
    }

    async fn run_read_query(&self, query: &str) -> Result<QueryResult> {
        ensure_read_only(query)?;
        let query = query.trim().trim_end_matches(';');
        self.run_one(Statement::new(query)).await
    }
}
