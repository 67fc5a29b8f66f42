//! Conversational session over the schema graph

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ChatConfig, ChatStrategy};
use crate::error::{Error, Result};
use crate::graph::{GraphStore, QueryResult, ensure_read_only};
use crate::llm::{ChatModel, FinishReason, Message};

use super::context::ContextBuilder;
use super::prompt::{answer_messages, cypher_messages, extract_cypher, render_query_section};

/// Answer to one question
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// Generated query, when the Cypher strategy ran
    pub cypher: Option<String>,
    pub rows: Option<QueryResult>,
    /// Why the generated query was rejected or failed
    pub query_error: Option<String>,
    pub model: String,
    pub tokens_used: u32,
}

/// A chat with bounded history
pub struct ChatSession {
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn GraphStore>,
    config: ChatConfig,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<dyn GraphStore>, config: ChatConfig) -> Self {
        Self {
            llm,
            store,
            config,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Whether questions will go through generated Cypher
    pub fn uses_cypher(&self) -> bool {
        self.config.strategy == ChatStrategy::Cypher && self.store.supports_cypher()
    }

    pub fn model_name(&self) -> String {
        self.llm.model_name()
    }

    /// Forget previous exchanges
    pub fn reset(&mut self) {
        self.history.clear();
        debug!("Chat history cleared");
    }

    pub async fn ask(&mut self, question: &str) -> Result<ChatAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question must not be empty".to_string()));
        }

        let context = ContextBuilder::new(self.store.as_ref(), &self.config)
            .build(question)
            .await?;
        let context_text = context.render(&self.config.language);

        let mut tokens_used = 0;
        let mut cypher = None;
        let mut rows = None;
        let mut query_error = None;

        if self.uses_cypher() {
            let reply = self.llm.chat(cypher_messages(question, &context_text)).await?;
            tokens_used += reply.tokens_used;

            match extract_cypher(&reply.content) {
                Some(query) => {
                    match self.run_generated_query(&query).await {
                        Ok(result) => rows = Some(result),
                        Err(e) => {
                            warn!(error = %e, "Generated query failed");
                            query_error = Some(e.to_string());
                        }
                    }
                    cypher = Some(query);
                }
                None => debug!("Model did not return a Cypher query"),
            }
        }

        let query_section = render_query_section(cypher.as_deref(), rows.as_ref(), query_error.as_deref());
        let messages = answer_messages(&self.history, question, &context_text, query_section.as_deref());
        let reply = self.llm.chat(messages).await?;
        tokens_used += reply.tokens_used;
        if reply.finish_reason == FinishReason::Length {
            warn!(model = %reply.model, "Answer was cut off at the token limit");
        }

        self.remember(question, &reply.content);

        info!(
            model = %reply.model,
            tokens = tokens_used,
            schemas = context.schemas.len(),
            cypher = cypher.is_some(),
            "Answered question"
        );

        Ok(ChatAnswer {
            answer: reply.content,
            cypher,
            rows,
            query_error,
            model: reply.model,
            tokens_used,
        })
    }

    async fn run_generated_query(&self, query: &str) -> Result<QueryResult> {
        ensure_read_only(query)?;
        debug!(query = %query, "Running generated query");
        self.store.run_read_query(query).await
    }

    fn remember(&mut self, question: &str, answer: &str) {
        self.history.push(Message::user(question));
        self.history.push(Message::assistant(answer));

        let max_messages = self.config.history_turns * 2;
        if self.history.len() > max_messages {
            let excess = self.history.len() - max_messages;
            self.history.drain(..excess);
        }
    }
}
