use async_trait::async_trait;

use crate::errors::MobiClawResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM provider trait. New backends implement this and get
/// registered under their config.toml key.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// One chat completion. Streaming responses are accumulated before returning.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> MobiClawResult<LlmResponse>;
}
