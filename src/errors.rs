//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Reply completion reasons (`TimedOut`, `ProcessExited`) are not errors;
/// they travel inside [`Reply`](crate::models::reply::Reply).
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Interpreter binary or story file could not be launched.
    Spawn(String),
    /// Pipe or file-system I/O failure on an otherwise live session.
    Io(String),
    /// The session's interpreter has exited; explicit restart or restore required.
    SessionDead(String),
    /// A different story is already running in this session.
    AlreadyPlaying(String),
    /// No story has been selected for this session yet.
    NoStory(String),
    /// The live interpreter process limit has been reached.
    Capacity(String),
    /// The interpreter did not acknowledge a save request.
    Save(String),
    /// The interpreter did not acknowledge a restore request.
    Restore(String),
    /// Restore filename resolves outside the session's save directory.
    PathEscape(String),
    /// Requested entity (story, save file, session) does not exist.
    NotFound(String),
    /// IPC communication failure.
    Ipc(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::SessionDead(msg) => write!(f, "session dead: {msg}"),
            Self::AlreadyPlaying(msg) => write!(f, "already playing: {msg}"),
            Self::NoStory(msg) => write!(f, "no story: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
            Self::Save(msg) => write!(f, "save: {msg}"),
            Self::Restore(msg) => write!(f, "restore: {msg}"),
            Self::PathEscape(msg) => write!(f, "path escape: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
