//! Acknowledgement matcher for interpreter save/restore replies.
//!
//! Interpreters answer `save` and `restore` in free text. The matcher looks
//! for configured words, case-insensitively and on word boundaries, so that
//! `Ok.` matches but `looking` does not.

use regex::Regex;

use crate::config::SaveConfig;
use crate::{AppError, Result};

/// Classification of an interpreter reply to a save or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// A success token was found and no failure token.
    Success,
    /// A failure token was found.
    Failure,
    /// Neither kind of token was found.
    Unknown,
}

/// Word-boundary token matcher.
#[derive(Debug, Clone)]
pub struct AckMatcher {
    success: Regex,
    failure: Option<Regex>,
    overwrite: Option<Regex>,
}

impl AckMatcher {
    /// Build a matcher from token lists.
    ///
    /// Empty strings are ignored. An empty failure list or overwrite token
    /// disables that check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no usable success token is given.
    pub fn new(success: &[String], failure: &[String], overwrite: &str) -> Result<Self> {
        let success = word_pattern(success)
            .ok_or_else(|| AppError::Config("at least one success token is required".into()))??;
        let failure = word_pattern(failure).transpose()?;
        let overwrite = word_pattern(&[overwrite.to_owned()]).transpose()?;

        Ok(Self {
            success,
            failure,
            overwrite,
        })
    }

    /// Build from the `[saves]` config section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the section has no success tokens.
    pub fn from_config(config: &SaveConfig) -> Result<Self> {
        Self::new(
            &config.success_tokens,
            &config.failure_tokens,
            &config.overwrite_token,
        )
    }

    /// Classify a final save/restore reply. A failure token wins over a
    /// success token in the same text.
    #[must_use]
    pub fn classify(&self, text: &str) -> Acknowledgement {
        if self.failure.as_ref().is_some_and(|re| re.is_match(text)) {
            Acknowledgement::Failure
        } else if self.success.is_match(text) {
            Acknowledgement::Success
        } else {
            Acknowledgement::Unknown
        }
    }

    /// Whether `text` asks to confirm overwriting an existing file.
    #[must_use]
    pub fn is_overwrite_prompt(&self, text: &str) -> bool {
        self.overwrite.as_ref().is_some_and(|re| re.is_match(text))
    }
}

fn word_pattern(tokens: &[String]) -> Option<Result<Regex>> {
    let alternatives: Vec<String> = tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }

    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Some(
        Regex::new(&pattern)
            .map_err(|err| AppError::Config(format!("invalid acknowledgement token: {err}"))),
    )
}
