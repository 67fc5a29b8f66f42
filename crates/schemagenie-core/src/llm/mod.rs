//! LLM integration - OpenRouter API
//!
//! - `client`: HTTP client with model fallback and rate-limit retry
//! - `types`: OpenAI-compatible request/response types

mod client;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{LlmClient, LlmClientBuilder};
pub use types::{ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole, Usage};

/// Anything that can answer a conversation
///
/// `LlmClient` is the production implementation; the chat session only
/// depends on this trait.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse>;

    /// Model identifier shown to the user
    fn model_name(&self) -> String;
}
