//! Natural-language assistant over the schema graph
//!
//! - `keywords`: keyword extraction from questions
//! - `context`: catalog lookups rendered as prompt context
//! - `prompt`: prompt templates and Cypher extraction
//! - `session`: `ChatSession` with bounded history

mod context;
mod keywords;
mod prompt;
mod session;

pub use context::{ChatContext, ContextBuilder};
pub use keywords::extract_keywords;
pub use prompt::{ANSWER_SYSTEM_PROMPT, CYPHER_SYSTEM_PROMPT, extract_cypher};
pub use session::{ChatAnswer, ChatSession};
