//! Chat command handlers.
//!
//! Each handler returns the messages to send back, in order. An empty list
//! means no reply.

use std::sync::Arc;

use tracing::info;

use super::messages::{self, NOTE_ENTER, NOTE_LOAD, NOTE_SAVE};
use super::router::{command_argument, BotState, HandlerFuture};
use super::ChatMessage;
use crate::models::reply::{CompletionReason, Reply};
use crate::session::Session;
use crate::AppError;

const LOAD_WORDS: &[&str] = &["load", "restore"];
const SAVE_WORDS: &[&str] = &["save", "dump", "backup"];

/// `/start`: greet the sender.
#[allow(clippy::needless_pass_by_value)]
pub fn start(_state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let name = message.from.as_deref().unwrap_or("player");
        Ok(vec![messages::welcome(name)])
    })
}

/// `/select [abbrev]`: list stories, or start the one named.
pub fn select(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let choice = command_argument(&message.text)
            .and_then(|arg| arg.split_whitespace().next())
            .and_then(|abbrev| state.catalog.by_abbrev(abbrev));

        let Some(story) = choice else {
            if state.catalog.is_empty() {
                return Ok(vec![messages::NO_GAMES.to_owned()]);
            }
            let menu: Vec<String> = state.catalog.iter().map(|s| messages::select_option(s)).collect();
            return Ok(vec![menu.join("\n")]);
        };

        let session = state.registry.get_or_create(&message.chat_id).await;
        let mut selected = session.select_story(Arc::clone(&story)).await;
        // Cleared between lookup and selection: use the replacement.
        if matches!(selected, Err(AppError::SessionDead(_))) && session.is_closed().await {
            selected = state
                .registry
                .get_or_create(&message.chat_id)
                .await
                .select_story(Arc::clone(&story))
                .await;
        }
        let intro = selected?;
        info!(chat_id = %message.chat_id, story = story.name(), "game started");

        Ok(vec![
            messages::starting(&story),
            messages::SAVE_HINT.to_owned(),
            render_reply(&intro),
        ])
    })
}

/// `/load [file]`: list saves, or restore the one named.
pub fn load(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let Some(session) = playing_session(&state, &message).await else {
            return Ok(vec![messages::SELECT_FIRST.to_owned()]);
        };

        let Some(file_name) = command_argument(&message.text) else {
            let saves = state.saves.list_saves(&session)?;
            if saves.is_empty() {
                return Ok(vec![messages::NO_SAVES.to_owned()]);
            }
            return Ok(vec![messages::save_list(&saves)]);
        };

        state.saves.restore(&session, file_name).await?;
        Ok(vec![messages::RESTORED.to_owned()])
    })
}

/// `/save`: write a new save file.
pub fn save(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let Some(session) = playing_session(&state, &message).await else {
            return Ok(vec![messages::PLAY_FIRST.to_owned()]);
        };

        let file = state.saves.save(&session).await?;
        Ok(vec![messages::saved(&file.file_name)])
    })
}

/// `/clear`: drop the session and kill its interpreter.
pub fn clear(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let text = if state.registry.remove(&message.chat_id).await {
            messages::CLEARED
        } else {
            messages::NOTHING_TO_CLEAR
        };
        Ok(vec![text.to_owned()])
    })
}

/// `/enter`: send an empty line.
pub fn enter(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let Some(session) = playing_session(&state, &message).await else {
            return Ok(Vec::new());
        };

        let reply = session.send("").await?;
        Ok(vec![render_reply(&reply)])
    })
}

/// `/i`: deliberately ignored.
#[allow(clippy::needless_pass_by_value)]
pub fn ignore(_state: Arc<BotState>, _message: ChatMessage) -> HandlerFuture {
    Box::pin(async { Ok(Vec::new()) })
}

/// `/ping`.
#[allow(clippy::needless_pass_by_value)]
pub fn ping(_state: Arc<BotState>, _message: ChatMessage) -> HandlerFuture {
    Box::pin(async { Ok(vec![messages::PONG.to_owned()]) })
}

/// `/msg <text>`: gameplay text that would otherwise look like a command.
pub fn msg(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let Some(text) = command_argument(&message.text).map(str::to_owned) else {
            return Ok(vec![messages::MSG_USAGE.to_owned()]);
        };
        play(&state, &message, &text).await
    })
}

/// Fallback: forward the text to the interpreter.
pub fn gameplay(state: Arc<BotState>, message: ChatMessage) -> HandlerFuture {
    Box::pin(async move {
        let text = message.text.clone();
        play(&state, &message, &text).await
    })
}

async fn play(state: &BotState, message: &ChatMessage, text: &str) -> crate::Result<Vec<String>> {
    let command = text.trim().to_lowercase();
    let session = playing_session(state, message).await;
    let has_story = session.is_some();
    let mut out = Vec::new();

    for (words, note) in [(LOAD_WORDS, NOTE_LOAD), (SAVE_WORDS, NOTE_SAVE)] {
        if words.iter().any(|w| command.contains(w)) {
            out.push(note.to_owned());
            if !has_story {
                return Ok(out);
            }
        }
    }

    let Some(session) = session else {
        out.push(messages::SELECT_PROMPT.to_owned());
        return Ok(out);
    };

    let reply = session.send(&command).await?;
    out.push(render_reply(&reply));

    let lower = reply.text.to_lowercase();
    if lower.contains(" return ") || lower.contains(" enter ") {
        out.push(NOTE_ENTER.to_owned());
    }
    Ok(out)
}

/// The chat's session, if it exists and has a story selected. Messages
/// from chats that never selected a story do not create sessions.
async fn playing_session(state: &BotState, message: &ChatMessage) -> Option<Arc<Session>> {
    let session = state.registry.get(&message.chat_id).await?;
    session.has_story().await.then_some(session)
}

/// Player-facing rendering of an interpreter reply, with notices for
/// truncation, timeouts, and exits.
#[must_use]
pub fn render_reply(reply: &Reply) -> String {
    let body = reply.display_text();
    let mut text = if body.is_empty() {
        messages::NO_OUTPUT.to_owned()
    } else {
        body.to_owned()
    };

    if reply.truncated {
        text.push('\n');
        text.push_str(messages::TRUNCATED_NOTICE);
    }
    match reply.reason {
        CompletionReason::Complete => {}
        CompletionReason::TimedOut => {
            text.push_str("\n\n");
            text.push_str(messages::TIMED_OUT_NOTICE);
        }
        CompletionReason::ProcessExited => {
            text.push_str("\n\n");
            text.push_str(messages::EXITED_NOTICE);
        }
    }
    text
}
