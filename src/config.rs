//! Global configuration parsing and validation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::story::{Catalog, Story};
use crate::{AppError, Result};

/// Interpreter launch and reply-boundary settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InterpreterConfig {
    /// Interpreter binary (e.g., `dfrotz`).
    pub binary: String,
    /// Arguments passed before the story file path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Output silence that marks a reply as complete.
    #[serde(default = "default_idle_window_ms")]
    pub idle_window_ms: u64,
    /// Upper bound on a single reply, regardless of output activity.
    #[serde(default = "default_reply_timeout_seconds")]
    pub reply_timeout_seconds: u64,
    /// Bytes retained per reply; the remainder is discarded.
    #[serde(default = "default_max_reply_bytes")]
    pub max_reply_bytes: usize,
}

impl InterpreterConfig {
    /// Quiescence window as a [`Duration`].
    #[must_use]
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    /// Overall reply timeout as a [`Duration`].
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_seconds)
    }
}

fn default_idle_window_ms() -> u64 {
    250
}

fn default_reply_timeout_seconds() -> u64 {
    10
}

fn default_max_reply_bytes() -> usize {
    65_536
}

/// Session registry settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Root directory holding one save directory per session key.
    pub save_root: PathBuf,
    /// Maximum number of live interpreter processes.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: u32,
    /// Idle time before a session is evicted; 0 disables eviction.
    #[serde(default = "default_idle_eviction_seconds")]
    pub idle_eviction_seconds: u64,
    /// Interval between idle-eviction sweeps.
    #[serde(default = "default_reaper_interval_seconds")]
    pub reaper_interval_seconds: u64,
}

fn default_max_concurrent_sessions() -> u32 {
    64
}

fn default_idle_eviction_seconds() -> u64 {
    21_600
}

fn default_reaper_interval_seconds() -> u64 {
    60
}

/// Save/restore dialog settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SaveConfig {
    /// File suffix appended to generated save names.
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Words that acknowledge a successful save or restore.
    #[serde(default = "default_success_tokens")]
    pub success_tokens: Vec<String>,
    /// Words that report a failed save or restore.
    #[serde(default = "default_failure_tokens")]
    pub failure_tokens: Vec<String>,
    /// Word identifying the overwrite confirmation prompt.
    #[serde(default = "default_overwrite_token")]
    pub overwrite_token: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            success_tokens: default_success_tokens(),
            failure_tokens: default_failure_tokens(),
            overwrite_token: default_overwrite_token(),
        }
    }
}

fn default_suffix() -> String {
    ".qzl".into()
}

fn default_success_tokens() -> Vec<String> {
    vec!["ok".into()]
}

fn default_failure_tokens() -> Vec<String> {
    vec!["failed".into()]
}

fn default_overwrite_token() -> String {
    "overwrite".into()
}

/// Story catalogue entry as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StoryEntry {
    /// Display name.
    pub name: String,
    /// Short code used by `/select`.
    pub abbrev: String,
    /// Story file, absolute or relative to `story_root`.
    pub filename: PathBuf,
}

fn default_ipc_name() -> String {
    "z5bot".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Named pipe / Unix socket identifier for the chat transport.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Directory that relative story filenames resolve against.
    #[serde(default)]
    pub story_root: Option<PathBuf>,
    /// Interpreter launch settings.
    pub interpreter: InterpreterConfig,
    /// Session registry settings.
    pub sessions: SessionConfig,
    /// Save/restore dialog settings.
    #[serde(default)]
    pub saves: SaveConfig,
    /// Ordered story catalogue.
    #[serde(default)]
    pub stories: Vec<StoryEntry>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the immutable story catalogue, resolving relative paths.
    ///
    /// Missing story files are logged but not rejected; launching them
    /// later reports a spawn error to the player.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        let stories = self
            .stories
            .iter()
            .map(|entry| {
                let path = match (&self.story_root, entry.filename.is_absolute()) {
                    (Some(root), false) => root.join(&entry.filename),
                    _ => entry.filename.clone(),
                };
                if !path.is_file() {
                    warn!(story = %entry.name, path = %path.display(), "story file not found");
                }
                Story::new(entry.name.clone(), entry.abbrev.trim().to_lowercase(), path)
            })
            .collect();
        Catalog::new(stories)
    }

    /// Idle time after which a session is evicted, or `None` when eviction is off.
    #[must_use]
    pub fn idle_eviction(&self) -> Option<Duration> {
        (self.sessions.idle_eviction_seconds > 0)
            .then(|| Duration::from_secs(self.sessions.idle_eviction_seconds))
    }

    fn validate(&self) -> Result<()> {
        if self.interpreter.binary.trim().is_empty() {
            return Err(AppError::Config("interpreter.binary must not be empty".into()));
        }

        if self.interpreter.idle_window_ms == 0 {
            return Err(AppError::Config(
                "interpreter.idle_window_ms must be greater than zero".into(),
            ));
        }

        if self.interpreter.reply_timeout_seconds == 0 {
            return Err(AppError::Config(
                "interpreter.reply_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.interpreter.idle_window() >= self.interpreter.reply_timeout() {
            return Err(AppError::Config(
                "interpreter.idle_window_ms must be shorter than the reply timeout".into(),
            ));
        }

        if self.interpreter.max_reply_bytes == 0 {
            return Err(AppError::Config(
                "interpreter.max_reply_bytes must be greater than zero".into(),
            ));
        }

        if self.sessions.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "sessions.max_concurrent_sessions must be greater than zero".into(),
            ));
        }

        if self.sessions.reaper_interval_seconds == 0 {
            return Err(AppError::Config(
                "sessions.reaper_interval_seconds must be greater than zero".into(),
            ));
        }

        if !self.saves.suffix.starts_with('.') || self.saves.suffix.len() < 2 {
            return Err(AppError::Config(
                "saves.suffix must start with '.' and name an extension".into(),
            ));
        }

        if self.saves.success_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(AppError::Config(
                "saves.success_tokens must contain at least one token".into(),
            ));
        }

        let mut seen = HashSet::new();
        for story in &self.stories {
            let abbrev = story.abbrev.trim().to_lowercase();
            if abbrev.is_empty() || abbrev.contains(char::is_whitespace) {
                return Err(AppError::Config(format!(
                    "story '{}' needs a single-word abbreviation",
                    story.name
                )));
            }
            if !seen.insert(abbrev) {
                return Err(AppError::Config(format!(
                    "duplicate story abbreviation '{}'",
                    story.abbrev
                )));
            }
        }

        Ok(())
    }
}
