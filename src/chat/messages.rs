//! Player-facing message texts.

use crate::models::story::Story;
use crate::AppError;

/// Sent when a gameplay message arrives before any story is selected.
pub const SELECT_PROMPT: &str = "Please use the /select command to select a game.";
/// `/load` without a story.
pub const SELECT_FIRST: &str = "You have to select a game first.";
/// `/save` without a story.
pub const PLAY_FIRST: &str = "You have to play a game first.";
/// Successful restore.
pub const RESTORED: &str = "Restored the game.";
/// Follows the `Starting ...` line after a selection.
pub const SAVE_HINT: &str = "Use /save to keep your progress and /load to return to it.";
/// `/ping` answer.
pub const PONG: &str = "Pong!";
/// Gameplay text that looks like a restore attempt.
pub const NOTE_LOAD: &str = "(Note: use /load.)";
/// Gameplay text that looks like a save attempt.
pub const NOTE_SAVE: &str = "(Note: use /save.)";
/// The game asked for the return key.
pub const NOTE_ENTER: &str = "(Note: You are able to use the return key by typing /enter.)";
/// `/msg` with nothing after it.
pub const MSG_USAGE: &str = "Usage: /msg <command>";
/// `/load` with no saves on disk.
pub const NO_SAVES: &str = "You have no saved games yet. Use /save first.";
/// `/clear` removed a session.
pub const CLEARED: &str = "Cleared. Use /select to start a new game.";
/// `/clear` with nothing to remove.
pub const NOTHING_TO_CLEAR: &str = "There was nothing to clear.";
/// Empty catalogue.
pub const NO_GAMES: &str = "No games are available.";
/// Reply with no visible text.
pub const NO_OUTPUT: &str = "(The game printed nothing.)";
/// Appended to a truncated reply.
pub const TRUNCATED_NOTICE: &str = "[Output truncated.]";
/// Appended to a reply that hit the timeout.
pub const TIMED_OUT_NOTICE: &str =
    "(The game is still busy. Any further output will follow your next command.)";
/// Appended to a reply during which the interpreter exited.
pub const EXITED_NOTICE: &str =
    "(The game has ended. Use /select to start it again, then /load to restore a save.)";

/// `/start` greeting.
#[must_use]
pub fn welcome(name: &str) -> String {
    format!("Welcome, {name}!\n{SELECT_PROMPT}")
}

/// One line of the `/select` menu.
#[must_use]
pub fn select_option(story: &Story) -> String {
    format!("For \"{}\", write /select {}.", story.name(), story.abbrev())
}

/// First line after a successful selection.
#[must_use]
pub fn starting(story: &Story) -> String {
    format!("Starting \"{}\"...", story.name())
}

/// Successful save.
#[must_use]
pub fn saved(file_name: &str) -> String {
    format!("Saved. Restore via /load {file_name}.")
}

/// Listing shown by `/load` without an argument.
#[must_use]
pub fn save_list(names: &[String]) -> String {
    let mut text = String::from("Your saved games, newest first:");
    for name in names {
        text.push('\n');
        text.push_str(name);
    }
    text.push_str("\nRestore one via /load <file>.");
    text
}

/// Stable player-facing text for every error kind.
#[must_use]
pub fn describe_error(err: &AppError) -> String {
    let text = match err {
        AppError::Config(_) => "The bot is misconfigured. Please tell its operator.",
        AppError::Spawn(_) => "The game could not be started.",
        AppError::Io(_) => "Something went wrong while talking to the game.",
        AppError::SessionDead(_) => {
            "The game is no longer running. Use /select to start it again, then /load to restore a save."
        }
        AppError::AlreadyPlaying(_) => "You are already playing another game. Use /clear first.",
        AppError::NoStory(_) => SELECT_FIRST,
        AppError::Capacity(_) => "Too many games are running right now. Please try again later.",
        AppError::Save(_) => "Something went wrong. The game was not saved.",
        AppError::Restore(_) => "Something went wrong. The game was not restored.",
        AppError::PathEscape(_) => "That save file name is not allowed.",
        AppError::NotFound(_) => "There is no save with that name. Send /load to list your saves.",
        AppError::Ipc(_) => "Something went wrong.",
    };
    text.to_owned()
}
