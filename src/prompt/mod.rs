//! Prompt sources
//!
//! A prompt source produces the next user prompt or reports that nothing
//! usable was received. Text and voice input are independent
//! implementations of the same trait.

mod text;
mod voice;

use async_trait::async_trait;

pub use text::TextPrompt;
pub use voice::{VoicePrompt, recognize};

/// Outcome of asking a source for the next prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    /// Lower-cased prompt text
    Prompt(String),
    /// Nothing usable this cycle; ask again
    NoInput,
    /// The source is exhausted and the session should end
    EndOfInput,
}

impl PromptEvent {
    /// Prompt text, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Prompt(text) => Some(text),
            Self::NoInput | Self::EndOfInput => None,
        }
    }
}

/// Produces user prompts
///
/// Futures are not `Send`: audio devices stay on the thread that opened them.
#[async_trait(?Send)]
pub trait PromptSource {
    /// Wait for the next prompt
    async fn next_prompt(&mut self) -> PromptEvent;
}

/// Normalize raw input into a prompt event
fn normalize(raw: &str) -> PromptEvent {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        PromptEvent::NoInput
    } else {
        PromptEvent::Prompt(trimmed.to_lowercase())
    }
}
