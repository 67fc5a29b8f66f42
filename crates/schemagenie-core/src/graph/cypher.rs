//! Cypher statements for the Neo4j backend
//!
//! Import statements reproduce the graph shape shared by every backend:
//! `Schema` nodes unique by id, `Attribute` nodes unique by name across all
//! schemas, and `Meta` nodes unique by (name, schema_id, language).

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::oca::SchemaRecord;

/// A parameterized Cypher statement in Neo4j HTTP API form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    #[serde(rename = "statement")]
    pub text: String,
    pub parameters: Map<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Map::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }
}

pub const MERGE_SCHEMA: &str = r#"
OPTIONAL MATCH (existing:Schema {id: $schema_id})
WITH existing IS NULL AS created
MERGE (s:Schema {id: $schema_id})
SET s.name = $schema_name,
    s.displayName = $schema_name,
    s.capture_base_id = $capture_base_id,
    s.type = $schema_type
RETURN created
"#;

pub const MERGE_ATTRIBUTE: &str = r#"
MERGE (a:Attribute {name: $attr_name})
SET a.type = $attr_type,
    a.unit = $attr_unit,
    a.description = $attr_description,
    a.format = $attr_format,
    a.vocabulary = $attr_vocabulary,
    a.codes = $attr_codes,
    a.search_text = $attr_search_text
WITH a
MATCH (s:Schema {id: $schema_id})
MERGE (s)-[:HAS_ATTRIBUTE]->(a)
"#;

pub const MERGE_META: &str = r#"
MERGE (m:Meta {name: $meta_name, schema_id: $schema_id, language: $meta_language})
SET m.description = $meta_desc
WITH m
MATCH (s:Schema {id: $schema_id})
MERGE (s)-[:HAS_META]->(m)
"#;

pub const SET_ORDERING: &str = r#"
MATCH (s:Schema {id: $schema_id})
SET s.attribute_ordering = $attribute_ordering,
    s.entry_code_ordering = $entry_code_ordering
"#;

pub const LIST_SCHEMAS: &str = r#"
MATCH (s:Schema)
OPTIONAL MATCH (s)-[:HAS_ATTRIBUTE]->(a:Attribute)
WITH s, count(DISTINCT a) AS attribute_count
OPTIONAL MATCH (s)-[:HAS_META]->(m:Meta)
RETURN s.id AS id, s.name AS name, s.type AS type, attribute_count, count(DISTINCT m) AS meta_count
ORDER BY name, id
"#;

pub const GET_SCHEMA: &str = r#"
MATCH (s:Schema)
WHERE s.id = $key OR s.name = $key
WITH s ORDER BY CASE WHEN s.id = $key THEN 0 ELSE 1 END, s.id
LIMIT 1
OPTIONAL MATCH (s)-[:HAS_ATTRIBUTE]->(a:Attribute)
WITH s, collect(a {.name, .type, .unit, .description, .format, .vocabulary, .codes}) AS attributes
OPTIONAL MATCH (s)-[:HAS_META]->(m:Meta)
RETURN s {.id, .name, .displayName, .capture_base_id, .type, .attribute_ordering, .entry_code_ordering} AS schema,
       attributes,
       collect(m {.name, .language, .description}) AS metas
"#;

pub const SEARCH_ATTRIBUTES: &str = r#"
MATCH (a:Attribute)
WHERE coalesce(a.search_text, toLower(a.name)) CONTAINS $keyword
OPTIONAL MATCH (s:Schema)-[:HAS_ATTRIBUTE]->(a)
WITH a, collect(DISTINCT s.name) AS schemas
RETURN a {.name, .type, .unit, .description, .format, .vocabulary, .codes} AS attribute, schemas
ORDER BY a.name
LIMIT $limit
"#;

pub const SCHEMAS_SHARING_ATTRIBUTE: &str = r#"
MATCH (s:Schema)-[:HAS_ATTRIBUTE]->(:Attribute {name: $name})
OPTIONAL MATCH (s)-[:HAS_ATTRIBUTE]->(a:Attribute)
WITH s, count(DISTINCT a) AS attribute_count
OPTIONAL MATCH (s)-[:HAS_META]->(m:Meta)
RETURN s.id AS id, s.name AS name, s.type AS type, attribute_count, count(DISTINCT m) AS meta_count
ORDER BY name, id
"#;

pub const GRAPH_STATS: &str = r#"
CALL { MATCH (s:Schema) RETURN count(s) AS schemas }
CALL { MATCH (a:Attribute) RETURN count(a) AS attributes }
CALL { MATCH (m:Meta) RETURN count(m) AS metas }
CALL { MATCH (:Schema)-[r:HAS_ATTRIBUTE|HAS_META]->() RETURN count(r) AS relationships }
RETURN schemas, attributes, metas, relationships
"#;

pub const HEALTH_CHECK: &str = "RETURN 1 AS ok";

fn opt(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Statements that write one schema, in execution order
///
/// The first statement returns a single `created` boolean.
pub fn import_statements(record: &SchemaRecord) -> Vec<Statement> {
    let mut statements = Vec::with_capacity(2 + record.attributes.len() + record.metas.len());

    statements.push(
        Statement::new(MERGE_SCHEMA.trim())
            .param("schema_id", record.id.clone())
            .param("schema_name", record.name.clone())
            .param("capture_base_id", opt(record.capture_base_id.clone()))
            .param("schema_type", record.schema_type.clone()),
    );

    for attr in &record.attributes {
        statements.push(
            Statement::new(MERGE_ATTRIBUTE.trim())
                .param("attr_name", attr.name.clone())
                .param("attr_type", attr.attribute_type.clone())
                .param("attr_unit", opt(attr.unit.clone()))
                .param("attr_description", opt(attr.description_json()))
                .param("attr_format", opt(attr.format.clone()))
                .param("attr_vocabulary", opt(attr.vocabulary_json()))
                .param("attr_codes", opt(attr.entry_codes_json()))
                .param("attr_search_text", attr.search_text())
                .param("schema_id", record.id.clone()),
        );
    }

    for meta in &record.metas {
        statements.push(
            Statement::new(MERGE_META.trim())
                .param("meta_name", meta.name.clone())
                .param("meta_desc", opt(meta.description.clone()))
                .param("meta_language", meta.language.clone())
                .param("schema_id", record.id.clone()),
        );
    }

    if let Some(ordering) = &record.ordering {
        statements.push(
            Statement::new(SET_ORDERING.trim())
                .param("schema_id", record.id.clone())
                .param("attribute_ordering", json!(ordering.attribute_ordering))
                .param("entry_code_ordering", ordering.entry_code_ordering_json()),
        );
    }

    statements
}

/// Clauses that modify data or reach administrative procedures
const WRITE_KEYWORDS: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH",
];

/// Remove string literals and comments so keywords inside them are ignored
fn strip_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        chars.next();
                    } else if inner == quote {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }
    out
}

fn tokens(sanitized: &str) -> Vec<String> {
    sanitized
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Reject anything but a single read-only Cypher query
pub fn ensure_read_only(query: &str) -> Result<()> {
    let sanitized = strip_literals(query);
    let trimmed = sanitized.trim().trim_end_matches(';').trim_end();

    if trimmed.is_empty() {
        return Err(Error::ReadOnlyViolation("empty query".to_string()));
    }
    if trimmed.contains(';') {
        return Err(Error::ReadOnlyViolation(
            "multiple statements are not allowed".to_string(),
        ));
    }

    let words = tokens(trimmed);

    let starts_ok = match words.as_slice() {
        [first, ..] if first == "MATCH" || first == "WITH" || first == "RETURN" || first == "UNWIND" => true,
        [first, second, ..] if first == "OPTIONAL" && second == "MATCH" => true,
        [first, second, ..] if first == "CALL" && second == "DB" => true,
        _ => false,
    };
    if !starts_ok {
        return Err(Error::ReadOnlyViolation(
            "query must start with MATCH, OPTIONAL MATCH, WITH, RETURN, UNWIND or CALL db.*".to_string(),
        ));
    }

    if let Some(keyword) = words.iter().find(|w| WRITE_KEYWORDS.contains(&w.as_str())) {
        return Err(Error::ReadOnlyViolation(format!("contains {}", keyword)));
    }

    for pair in words.windows(2) {
        let (a, b) = (pair[0].as_str(), pair[1].as_str());
        if a == "LOAD" && b == "CSV" {
            return Err(Error::ReadOnlyViolation("contains LOAD CSV".to_string()));
        }
        if a == "CALL" && (b == "DBMS" || b == "APOC") {
            return Err(Error::ReadOnlyViolation(format!("calls {} procedures", b.to_lowercase())));
        }
    }

    Ok(())
}
