//! Interpreter child processes and their output framing.
//!
//! - `process`: spawning, writing, liveness, and termination of one
//!   interpreter per session.
//! - `transcript`: output pumps and the quiescence-based reply reader.

pub mod process;
pub mod transcript;

pub use process::{InterpreterProcess, LaunchConfig};
pub use transcript::TranscriptReader;
