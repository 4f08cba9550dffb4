//! Chat completion against a hosted LLM service

mod openai;
pub mod retry;

use async_trait::async_trait;

pub use openai::{DEFAULT_BASE_URL, OpenAiChatClient};
pub use retry::RetryPolicy;

use crate::Result;
use crate::conversation::Turn;

/// Reply to a completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Assistant text
    pub reply: String,
    /// Service-reported token usage of the whole request
    pub total_tokens: u32,
}

/// Sends an ordered conversation to a completion service
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete the conversation
    ///
    /// # Errors
    ///
    /// Returns error on transport or service failure
    async fn complete(&self, turns: &[Turn]) -> Result<Completion>;
}
