//! Conversation history with token-budget eviction
//!
//! The conversation always starts with one or two priming turns (the persona
//! and an optional instruction turn). Everything after them is a sequence of
//! user/assistant pairs that is trimmed from the front, a pair at a time, once
//! the service reports that a request consumed more tokens than the input
//! limit allows. Evicted turns are written to the [`ConversationLog`] before
//! they are dropped.

mod log;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::log::{ConversationLog, END_MARKER, START_MARKER};

use crate::{Error, Result};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Eviction settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Token usage above which old pairs are evicted
    pub input_limit: u32,
    /// Number of user/assistant pairs removed per eviction
    pub clear_pairs: usize,
}

/// Ordered conversation history
pub struct Conversation {
    turns: Vec<Turn>,
    priming_len: usize,
    budget: TokenBudget,
    log: ConversationLog,
}

impl Conversation {
    /// Create a conversation from its priming turns
    ///
    /// # Errors
    ///
    /// Returns error unless there are one or two priming turns
    pub fn new(priming: Vec<Turn>, budget: TokenBudget, log: ConversationLog) -> Result<Self> {
        if priming.is_empty() || priming.len() > 2 {
            return Err(Error::Config(format!(
                "conversation needs one or two priming turns, got {}",
                priming.len()
            )));
        }

        Ok(Self {
            priming_len: priming.len(),
            turns: priming,
            budget,
            log,
        })
    }

    /// Append a turn at the end of the conversation
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remove the trailing user turn of a request that never got a reply
    ///
    /// Returns the removed turn. Priming turns are never touched.
    pub fn discard_pending_user(&mut self) -> Option<Turn> {
        if self.turns.len() > self.priming_len
            && self.turns.last().is_some_and(|t| t.role == Role::User)
        {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Evict the oldest pairs if the reported usage exceeds the input limit
    ///
    /// Removes up to `clear_pairs` complete user/assistant pairs right after
    /// the priming turns, logging them first. Returns the number of pairs
    /// evicted.
    pub fn evict_if_over_budget(&mut self, token_count: u32) -> usize {
        if token_count <= self.budget.input_limit {
            return 0;
        }

        let pairs = self.budget.clear_pairs.min(self.pair_count());
        if pairs == 0 {
            tracing::debug!(token_count, "over budget but nothing to evict");
            return 0;
        }

        let end = self.priming_len + pairs * 2;
        self.log.append_turns(&self.turns[self.priming_len..end]);
        self.turns.drain(self.priming_len..end);

        tracing::info!(
            token_count,
            input_limit = self.budget.input_limit,
            pairs,
            remaining = self.turns.len(),
            "evicted old conversation turns"
        );

        pairs
    }

    /// Write every non-priming turn to the log
    pub fn flush_to_log(&self) {
        self.log.append_turns(self.history());
    }

    /// All turns, priming turns first
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns after the priming section
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.turns[self.priming_len..]
    }

    /// Priming turns only
    #[must_use]
    pub fn priming(&self) -> &[Turn] {
        &self.turns[..self.priming_len]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Never true: priming turns are always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub const fn priming_len(&self) -> usize {
        self.priming_len
    }

    /// Number of complete pairs after the priming turns
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.history().len() / 2
    }

    #[must_use]
    pub const fn budget(&self) -> TokenBudget {
        self.budget
    }

    #[must_use]
    pub const fn log(&self) -> &ConversationLog {
        &self.log
    }
}
