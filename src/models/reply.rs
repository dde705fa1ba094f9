//! Reply blocks produced by the transcript reader.

use serde::Serialize;

/// Why a reply block ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Output went quiet for the idle window.
    Complete,
    /// The overall reply timeout elapsed first; the process is still running.
    TimedOut,
    /// The interpreter's output stream closed.
    ProcessExited,
}

/// One block of interpreter output plus how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Accumulated output text.
    pub text: String,
    /// Completion reason.
    pub reason: CompletionReason,
    /// Whether output beyond the size cap was discarded.
    pub truncated: bool,
}

impl Reply {
    /// Construct a reply.
    #[must_use]
    pub fn new(text: impl Into<String>, reason: CompletionReason) -> Self {
        Self {
            text: text.into(),
            reason,
            truncated: false,
        }
    }

    /// Whether the reply ended on a quiescence boundary.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.reason == CompletionReason::Complete
    }

    /// Whether the interpreter exited while producing this reply.
    #[must_use]
    pub fn process_exited(&self) -> bool {
        self.reason == CompletionReason::ProcessExited
    }

    /// Text with the trailing input prompt (`>`) and surrounding blank
    /// lines removed, suitable for showing to a player.
    #[must_use]
    pub fn display_text(&self) -> &str {
        let trimmed = self.text.trim_end();
        let without_prompt = trimmed.strip_suffix('>').unwrap_or(trimmed);
        without_prompt.trim_matches(|c: char| c == '\n' || c == ' ')
    }
}
