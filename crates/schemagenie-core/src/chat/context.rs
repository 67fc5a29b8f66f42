//! Catalog context for a question
//!
//! Looks up schemas and attributes that match the question's keywords and
//! renders them as plain text for the LLM.

use std::collections::HashSet;
use std::fmt::Write as _;

use tracing::debug;

use crate::catalog::{AttributeMatch, SchemaDetail, SchemaSummary, render_attribute_match, render_schema_context};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::graph::GraphStore;

use super::keywords::extract_keywords;

/// Grounding gathered for one question
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub keywords: Vec<String>,
    pub schemas: Vec<SchemaDetail>,
    pub attributes: Vec<AttributeMatch>,
    /// Every schema in the graph, used when nothing matched
    pub catalog: Vec<SchemaSummary>,
}

impl ChatContext {
    /// Whether no schema or attribute matched
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.attributes.is_empty()
    }

    pub fn render(&self, language: &str) -> String {
        let mut out = String::new();

        if self.is_empty() {
            if self.catalog.is_empty() {
                out.push_str("The graph contains no schemas yet.\n");
            } else {
                let names: Vec<&str> = self.catalog.iter().map(|s| s.name.as_str()).collect();
                let _ = writeln!(
                    out,
                    "No schema or attribute matched the question. Imported schemas ({}): {}",
                    names.len(),
                    names.join(", ")
                );
            }
            return out;
        }

        if !self.schemas.is_empty() {
            out.push_str("## Schemas\n");
            for schema in &self.schemas {
                out.push_str(&render_schema_context(schema, language));
                out.push('\n');
            }
        }

        if !self.attributes.is_empty() {
            out.push_str("## Matching attributes\n");
            for hit in &self.attributes {
                let _ = writeln!(out, "- {}", render_attribute_match(hit, language));
            }
        }

        out
    }
}

/// Builds a `ChatContext` from a graph store
pub struct ContextBuilder<'a> {
    store: &'a dyn GraphStore,
    max_schemas: usize,
    max_attributes: usize,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(store: &'a dyn GraphStore, config: &ChatConfig) -> Self {
        Self {
            store,
            max_schemas: config.max_schemas.max(1),
            max_attributes: config.max_attributes,
        }
    }

    pub async fn build(&self, question: &str) -> Result<ChatContext> {
        let keywords = extract_keywords(question);
        let catalog = self.store.list_schemas().await?;

        // Schema ids in priority order: direct name/id hits, then users of matched attributes
        let mut schema_ids: Vec<String> = Vec::new();
        let mut seen_ids = HashSet::new();

        for summary in &catalog {
            let name = summary.name.to_lowercase();
            let id = summary.id.to_lowercase();
            if keywords.iter().any(|k| name.contains(k) || id.contains(k))
                && seen_ids.insert(summary.id.clone())
            {
                schema_ids.push(summary.id.clone());
            }
        }

        let mut attributes: Vec<AttributeMatch> = Vec::new();
        let mut seen_attributes = HashSet::new();

        for keyword in &keywords {
            if attributes.len() >= self.max_attributes {
                break;
            }
            for hit in self.store.search_attributes(keyword, self.max_attributes).await? {
                if attributes.len() >= self.max_attributes {
                    break;
                }
                if seen_attributes.insert(hit.attribute.name.clone()) {
                    attributes.push(hit);
                }
            }
        }

        for hit in &attributes {
            for schema_name in &hit.schemas {
                for summary in catalog.iter().filter(|s| &s.name == schema_name) {
                    if seen_ids.insert(summary.id.clone()) {
                        schema_ids.push(summary.id.clone());
                    }
                }
            }
        }

        let mut schemas = Vec::new();
        for id in schema_ids.iter().take(self.max_schemas) {
            if let Some(detail) = self.store.get_schema(id).await? {
                schemas.push(detail);
            }
        }

        debug!(
            keywords = ?keywords,
            schemas = schemas.len(),
            attributes = attributes.len(),
            "Built chat context"
        );

        Ok(ChatContext {
            keywords,
            schemas,
            attributes,
            catalog,
        })
    }
}
