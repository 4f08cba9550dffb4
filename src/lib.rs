//! Carebot - a caretaker assistant for elderly users
//!
//! Takes prompts by keyboard or microphone, answers them through a hosted
//! chat-completion service, and reads the answers aloud.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Prompt Source                    │
//! │      TextPrompt  │  VoicePrompt (mic + STT)   │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │                  Session                      │
//! │  Conversation buffer  │  Completion client    │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │               Speech Output                   │
//! │      LocalSpeech  │  RemoteSpeech (TTS)       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prompt;
pub mod session;
pub mod speech;
pub mod voice;

pub use completion::{Completer, Completion, OpenAiChatClient, RetryPolicy};
pub use config::Config;
pub use conversation::{Conversation, ConversationLog, Role, TokenBudget, Turn};
pub use error::{Error, Result};
pub use prompt::{PromptEvent, PromptSource, TextPrompt, VoicePrompt};
pub use session::Session;
pub use speech::{LocalSpeech, RemoteSpeech, Speaker, SpeechEngine};
