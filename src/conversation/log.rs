//! Append-only conversation log
//!
//! Failures to write are reported through `tracing` and swallowed: losing a
//! log line must never end a conversation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Turn;

/// Written when a session starts
pub const START_MARKER: &str = "======== START ========";

/// Written when a session ends, followed by a blank line
pub const END_MARKER: &str = "======== END ========";

/// Text file that evicted and leftover turns are appended to
#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the start of a session
    pub fn start_session(&self) {
        self.append(&format!("{START_MARKER}\n"));
    }

    /// Record the end of a session
    pub fn end_session(&self) {
        self.append(&format!("{END_MARKER}\n\n"));
    }

    /// Append turns, one line each
    pub fn append_turns(&self, turns: &[Turn]) {
        if turns.is_empty() {
            return;
        }

        let stamp = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        let text: String = turns
            .iter()
            .map(|t| format_turn(&stamp, t))
            .collect();

        self.append(&text);
    }

    fn append(&self, text: &str) {
        if let Err(e) = self.try_append(text) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to write conversation log"
            );
        }
    }

    fn try_append(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())
    }
}

fn format_turn(stamp: &str, turn: &Turn) -> String {
    let content = turn.content().replace('\r', "").replace('\n', "\\n");
    format!("[{stamp}] {}: {content}\n", turn.role())
}
