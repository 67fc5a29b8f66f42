//! SchemaGenie Core Library
//!
//! This crate provides the core functionality for SchemaGenie, including:
//! - OCA package parsing and normalization
//! - Property graph stores (Neo4j over HTTP, embedded SQLite)
//! - Folder import pipeline
//! - Catalog read model for schemas and attributes
//! - LLM integration (OpenRouter API)
//! - Natural-language chat over the catalog

pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod graph;
pub mod importer;
pub mod llm;
pub mod oca;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{AttributeMatch, SchemaDetail, SchemaSummary};
    pub use crate::chat::{ChatAnswer, ChatSession};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::graph::{BackendKind, GraphStore, open_store};
    pub use crate::importer::{ImportReport, Importer};
    pub use crate::llm::{ChatModel, LlmClient};
}
