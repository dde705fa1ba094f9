#![forbid(unsafe_code)]

//! `z5bot` — chat front end for interactive-fiction interpreters.
//!
//! Each player gets a private interpreter process. Player messages go in
//! through [`chat::Bot`]; [`session::SessionRegistry`] owns the sessions.

pub mod chat;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod ipc;
pub mod models;
pub mod savegame;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
