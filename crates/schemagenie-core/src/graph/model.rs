//! Shared graph store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which graph backend a store talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Neo4j over the HTTP transactional Cypher endpoint
    #[default]
    Neo4j,
    /// Embedded SQLite property graph
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neo4j => "neo4j",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neo4j" => Some(Self::Neo4j),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of writing one schema to a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub schema_id: String,
    pub schema_name: String,
    /// `false` when an existing schema node was updated
    pub created: bool,
    pub attributes_written: usize,
    pub metas_written: usize,
    pub ordering_written: bool,
}

/// Node and relationship counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub schemas: u64,
    pub attributes: u64,
    pub metas: u64,
    pub relationships: u64,
}

/// Tabular result of a Cypher read query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a plain-text table, truncated to `max_rows`
    pub fn to_text(&self, max_rows: usize) -> String {
        let mut out = self.columns.join(" | ");
        out.push('\n');
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Null => "null".to_string(),
                    other => other.to_string(),
                })
                .collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!("... {} more rows\n", self.rows.len() - max_rows));
        }
        out
    }
}

/// History entry for one folder import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRunSummary {
    pub id: String,
    pub folder: String,
    pub files_total: u64,
    pub files_imported: u64,
    pub files_failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("Neo4j"), Some(BackendKind::Neo4j));
        assert_eq!(BackendKind::parse("sqlite"), Some(BackendKind::Sqlite));
        assert_eq!(BackendKind::parse("postgres"), None);
        assert_eq!(BackendKind::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_query_result_to_text() {
        let result = QueryResult {
            columns: vec!["name".to_string(), "count".to_string()],
            rows: vec![
                vec![json!("soil"), json!(4)],
                vec![json!("water"), Value::Null],
                vec![json!("air"), json!(1)],
            ],
        };
        let text = result.to_text(2);
        assert!(text.starts_with("name | count\n"));
        assert!(text.contains("soil | 4"));
        assert!(text.contains("water | null"));
        assert!(!text.contains("air"));
        assert!(text.contains("1 more rows"));
    }
}
