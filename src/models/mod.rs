//! Domain model module declarations.

pub mod key;
pub mod reply;
pub mod story;
