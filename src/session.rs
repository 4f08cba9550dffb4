//! Interactive session
//!
//! Drives the prompt, respond and speak cycle over one [`Conversation`] and
//! brackets it with the log's START and END markers.

use std::future::Future;

use crate::Result;
use crate::completion::Completer;
use crate::conversation::{Conversation, Turn};
use crate::prompt::{PromptEvent, PromptSource};
use crate::speech::Speaker;

/// Prompt used for the wellbeing check
pub const WELLBEING_PROMPT: &str = "Ask me the question: Are you okay?";

/// One caretaker session
pub struct Session {
    conversation: Conversation,
    completer: Box<dyn Completer>,
    speaker: Speaker,
}

impl Session {
    /// Start a session and mark it in the conversation log
    #[must_use]
    pub fn start(
        conversation: Conversation,
        completer: Box<dyn Completer>,
        speaker: Speaker,
    ) -> Self {
        conversation.log().start_session();
        tracing::info!(log = %conversation.log().path().display(), "session started");

        Self {
            conversation,
            completer,
            speaker,
        }
    }

    /// Send the priming turns once so the assistant adopts its persona
    ///
    /// The reply is shown but not kept in the conversation. Failures are
    /// logged and the session carries on.
    pub async fn prime(&mut self) {
        match self.completer.complete(self.conversation.priming()).await {
            Ok(completion) => {
                println!("Initial response: {}", completion.reply);
                println!("Assistant initialised.");
                tracing::debug!(total_tokens = completion.total_tokens, "primed");
            }
            Err(e) => {
                tracing::error!(error = %e, "priming request failed");
            }
        }
    }

    /// Respond to a prompt
    ///
    /// Returns `Ok(None)` without touching the conversation when there is no
    /// prompt or it is blank. On success the user and assistant turns are kept, the oldest
    /// pairs are evicted if the token budget was exceeded, and the reply is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the completion error; the pending user turn is discarded so
    /// the conversation is left as it was
    pub async fn respond(&mut self, prompt: Option<&str>) -> Result<Option<String>> {
        let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) else {
            println!("No prompt given.");
            return Ok(None);
        };

        self.conversation.append(Turn::user(prompt));

        let completion = match self.completer.complete(self.conversation.turns()).await {
            Ok(completion) => completion,
            Err(e) => {
                self.conversation.discard_pending_user();
                return Err(e);
            }
        };

        self.conversation.append(Turn::assistant(completion.reply.clone()));

        println!("Response: {}", completion.reply);
        println!("Total tokens used: {}", completion.total_tokens);

        let evicted = self.conversation.evict_if_over_budget(completion.total_tokens);
        if evicted > 0 {
            println!("Old conversations cleared.");
        }

        tracing::debug!(
            turns = self.conversation.len(),
            total_tokens = completion.total_tokens,
            evicted,
            "turn complete"
        );

        Ok(Some(completion.reply))
    }

    /// Ask the user how they are and speak the question
    pub async fn check_in(&mut self) {
        tracing::info!("wellbeing check");
        let reply = self.respond_or_report(Some(WELLBEING_PROMPT)).await;
        self.speaker.speak(reply.as_deref()).await;
    }

    /// Run one prompt, respond and speak cycle
    ///
    /// Returns `false` once the source has no more input.
    pub async fn run_turn(&mut self, source: &mut dyn PromptSource) -> bool {
        let prompt = match source.next_prompt().await {
            PromptEvent::EndOfInput => return false,
            PromptEvent::NoInput => None,
            PromptEvent::Prompt(text) => Some(text),
        };

        let reply = self.respond_or_report(prompt.as_deref()).await;
        self.speaker.speak(reply.as_deref()).await;
        true
    }

    /// Run cycles until the source is exhausted
    pub async fn run(&mut self, source: &mut dyn PromptSource) {
        while self.run_turn(source).await {}
        tracing::debug!("prompt source exhausted");
    }

    /// Prime, optionally check in, then run until the source is exhausted
    /// or `shutdown` resolves
    ///
    /// Returns `true` when the session was interrupted.
    pub async fn run_until(
        &mut self,
        source: &mut dyn PromptSource,
        check_in: bool,
        shutdown: impl Future<Output = ()>,
    ) -> bool {
        tokio::select! {
            () = async {
                self.prime().await;
                if check_in {
                    self.check_in().await;
                }
                self.run(source).await;
            } => false,
            () = shutdown => {
                tracing::info!("interrupted");
                true
            }
        }
    }

    /// Write the remaining turns and the END marker to the log
    pub fn finish(self) {
        self.conversation.flush_to_log();
        self.conversation.log().end_session();
        tracing::info!(turns = self.conversation.len(), "session finished");
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    async fn respond_or_report(&mut self, prompt: Option<&str>) -> Option<String> {
        match self.respond(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "completion failed");
                println!("Could not get a response: {e}");
                None
            }
        }
    }
}
