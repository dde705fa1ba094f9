//! Per-player sessions and their registry.
//!
//! - `game`: one player's story, interpreter, and save directory behind a
//!   FIFO lock.
//! - `registry`: key → session map; sole creator and destroyer of sessions.
//! - `reaper`: periodic idle eviction and exit detection.

pub mod game;
pub mod reaper;
pub mod registry;

pub use game::{Session, SessionGuard, SessionSettings};
pub use reaper::spawn_idle_reaper;
pub use registry::{SessionRegistry, SessionSummary, SweepReport};
