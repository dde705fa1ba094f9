//! Chat front end: turns player messages into session operations.
//!
//! - `router`: command name → handler map and the [`Bot`] entry point.
//! - `handlers`: one function per command, plus gameplay.
//! - `messages`: every player-visible string.

pub mod handlers;
pub mod messages;
pub mod router;

use serde::{Deserialize, Serialize};

use crate::models::key::SessionKey;

pub use router::{Bot, BotState, CommandRouter};

/// One incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Chat the message came from; one session per chat.
    pub chat_id: SessionKey,
    /// Sender display name, if known.
    pub from: Option<String>,
    /// Raw message text.
    pub text: String,
}

impl ChatMessage {
    /// Build a message.
    #[must_use]
    pub fn new(chat_id: impl Into<SessionKey>, from: Option<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            from,
            text: text.into(),
        }
    }
}
