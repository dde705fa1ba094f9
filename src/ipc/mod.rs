//! Local IPC layer for `z5bot-ctl` interaction.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line chat messages and admin commands.

pub mod server;

pub use server::spawn_ipc_server;
