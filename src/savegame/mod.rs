//! Save and restore on top of session sends.

pub mod matcher;
pub mod path_safety;
pub mod protocol;

pub use matcher::{AckMatcher, Acknowledgement};
pub use protocol::{SaveFile, SaveProtocol};
