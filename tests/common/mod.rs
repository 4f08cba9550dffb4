//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use carebot::{
    Completer, Completion, Conversation, ConversationLog, Error, Result, Speaker, SpeechEngine,
    TokenBudget, Turn,
};

/// Completer that replays scripted results and records every request
#[derive(Default)]
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedCompleter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    #[must_use]
    pub fn reply(self, text: &str, total_tokens: u32) -> Self {
        self.replies.lock().unwrap().push_back(Ok(Completion {
            reply: text.to_string(),
            total_tokens,
        }));
        self
    }

    /// Queue a failure
    #[must_use]
    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Completion(message.to_string())));
        self
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, turns: &[Turn]) -> Result<Completion> {
        self.requests.lock().unwrap().push(turns.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Completion("no scripted reply".to_string())))
    }
}

/// Completer wrapper that shares its request history with the test
pub struct SharedCompleter(pub std::sync::Arc<ScriptedCompleter>);

#[async_trait]
impl Completer for SharedCompleter {
    async fn complete(&self, turns: &[Turn]) -> Result<Completion> {
        self.0.complete(turns).await
    }
}

/// Speech engine that records what it was asked to say
pub struct RecordingEngine {
    pub spoken: Rc<RefCell<Vec<String>>>,
}

#[async_trait(?Send)]
impl SpeechEngine for RecordingEngine {
    async fn say(&mut self, text: &str) -> Result<()> {
        self.spoken.borrow_mut().push(text.to_string());
        Ok(())
    }
}

/// Speaker backed by a [`RecordingEngine`]
#[must_use]
pub fn recording_speaker() -> (Speaker, Rc<RefCell<Vec<String>>>) {
    let spoken = Rc::new(RefCell::new(Vec::new()));
    let engine = RecordingEngine {
        spoken: Rc::clone(&spoken),
    };
    (Speaker::new(Box::new(engine)), spoken)
}

/// Default two-turn priming
#[must_use]
pub fn priming() -> Vec<Turn> {
    vec![
        Turn::system("You are an elderly caretaker"),
        Turn::user("Treat me as an elderly and give me short and simple responses"),
    ]
}

/// Conversation logging into a fresh temp directory
pub fn conversation(input_limit: u32, clear_pairs: usize) -> (Conversation, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let log = ConversationLog::new(dir.path().join("conversation.log"));
    let budget = TokenBudget {
        input_limit,
        clear_pairs,
    };
    let conversation = Conversation::new(priming(), budget, log).expect("valid priming");
    (conversation, dir)
}

/// Read the conversation log written under `dir`
#[must_use]
pub fn read_log(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join("conversation.log")).unwrap_or_default()
}
