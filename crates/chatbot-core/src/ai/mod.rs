//! Completion service integrations

pub mod openai;

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::state::ChatMessage;

pub use openai::OpenAIClient;

/// A chat-completion backend that turns a conversation into one reply
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send the ordered conversation and return the reply text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;

    /// Model identifier sent with each request
    fn model(&self) -> &str;
}
