//! Opaque per-player session key.

use std::fmt::{Display, Formatter};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Prefix for per-key save directory names; keeps every name non-empty and
/// distinct from `.`/`..`.
const DIR_PREFIX: &str = "chat-";

/// Opaque identifier for one player (typically a chat id).
///
/// Two keys are the same session iff their strings are equal. Deserializes
/// from a JSON string or integer; always serializes as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "RawKey")]
pub struct SessionKey(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKey {
    Text(String),
    Number(i64),
}

impl From<RawKey> for SessionKey {
    fn from(raw: RawKey) -> Self {
        match raw {
            RawKey::Text(text) => Self(text),
            RawKey::Number(number) => Self::from(number),
        }
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}

impl SessionKey {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system-safe directory name derived from the key.
    ///
    /// ASCII alphanumerics, `-` and `_` pass through; every other byte is
    /// written as `%XX`. The mapping is injective, so distinct keys never
    /// share a save directory.
    #[must_use]
    pub fn dir_name(&self) -> String {
        let mut name = String::with_capacity(DIR_PREFIX.len() + self.0.len());
        name.push_str(DIR_PREFIX);
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                let _ = write!(name, "%{byte:02X}");
            }
        }
        name
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for SessionKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<i64> for SessionKey {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}
