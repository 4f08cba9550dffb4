//! Typed prompts, one line at a time

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use super::{PromptEvent, PromptSource, normalize};

/// Reads prompts line by line
pub struct TextPrompt<R> {
    reader: R,
    show_prompt: bool,
}

impl TextPrompt<BufReader<Stdin>> {
    /// Read prompts from standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            show_prompt: true,
        }
    }
}

impl<R: AsyncBufRead + Unpin> TextPrompt<R> {
    /// Read prompts from any buffered reader, without printing `Prompt: `
    pub const fn from_reader(reader: R) -> Self {
        Self {
            reader,
            show_prompt: false,
        }
    }
}

#[async_trait(?Send)]
impl<R: AsyncBufRead + Unpin> PromptSource for TextPrompt<R> {
    async fn next_prompt(&mut self) -> PromptEvent {
        if self.show_prompt {
            print!("Prompt: ");
            let _ = std::io::stdout().flush();
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::debug!("input closed");
                PromptEvent::EndOfInput
            }
            Ok(_) => normalize(&line),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read prompt");
                PromptEvent::EndOfInput
            }
        }
    }
}
