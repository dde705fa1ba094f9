//! Save and restore dialogs driven through the interpreter's own commands.
//!
//! Both dialogs hold the session lock for every step, so no other command
//! from the same player can land between `save` and the file name.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info, info_span, warn, Instrument};

use super::matcher::{AckMatcher, Acknowledgement};
use super::path_safety::resolve_save_path;
use crate::config::SaveConfig;
use crate::models::reply::Reply;
use crate::session::{Session, SessionGuard};
use crate::{AppError, Result};

/// A save file written by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File name the player passes to `/load`.
    pub file_name: String,
}

/// Runs save/restore dialogs and lists save files.
#[derive(Debug, Clone)]
pub struct SaveProtocol {
    matcher: AckMatcher,
    suffix: String,
}

impl SaveProtocol {
    /// Create a protocol with the given matcher and file suffix.
    #[must_use]
    pub fn new(matcher: AckMatcher, suffix: impl Into<String>) -> Self {
        Self {
            matcher,
            suffix: suffix.into(),
        }
    }

    /// Build from the `[saves]` config section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the acknowledgement tokens are invalid.
    pub fn from_config(config: &SaveConfig) -> Result<Self> {
        Ok(Self::new(AckMatcher::from_config(config)?, config.suffix.clone()))
    }

    /// The acknowledgement matcher in use.
    #[must_use]
    pub fn matcher(&self) -> &AckMatcher {
        &self.matcher
    }

    /// File name for a save made at `now`.
    #[must_use]
    pub fn save_file_name(&self, now: DateTime<Local>) -> String {
        format!("{}{}", now.format("%y%m%d-%H%M%S"), self.suffix)
    }

    /// First file name for a save made at `now` that does not yet exist in
    /// `dir`. Later saves within the same second get `-2`, `-3`, ...
    #[must_use]
    pub fn unused_save_file_name(&self, dir: &Path, now: DateTime<Local>) -> String {
        let stamp = now.format("%y%m%d-%H%M%S");
        let mut file_name = self.save_file_name(now);
        let mut counter: u32 = 1;
        while dir.join(&file_name).symlink_metadata().is_ok() {
            counter += 1;
            file_name = format!("{stamp}-{counter}{}", self.suffix);
        }
        file_name
    }

    /// Save the session's game to a new timestamped file.
    ///
    /// # Errors
    ///
    /// - `AppError::NoStory` — no story selected.
    /// - `AppError::SessionDead` — the interpreter is gone or exits mid-dialog.
    /// - `AppError::Io` — the save directory cannot be created.
    /// - `AppError::Save` — the interpreter did not acknowledge the save.
    pub async fn save(&self, session: &Session) -> Result<SaveFile> {
        let span = info_span!("save_game", session_key = %session.key());
        async move {
            let mut guard = session.lock().await;
            if !guard.has_story() {
                return Err(AppError::NoStory("nothing to save".into()));
            }

            tokio::fs::create_dir_all(session.save_dir()).await.map_err(|err| {
                AppError::Io(format!(
                    "cannot create save directory {}: {err}",
                    session.save_dir().display()
                ))
            })?;

            let file_name = self.unused_save_file_name(session.save_dir(), Local::now());
            let path = session.save_dir().join(&file_name);

            guard.drain_output();
            let prompt = exchange(&mut guard, "save").await?;
            debug!(prompt = prompt.display_text(), "save prompt");

            let mut reply = exchange(&mut guard, &path.to_string_lossy()).await?;
            if self.matcher.is_overwrite_prompt(&reply.text) {
                debug!("confirming overwrite");
                reply = exchange(&mut guard, "y").await?;
            }

            match self.matcher.classify(&reply.text) {
                Acknowledgement::Success => {
                    info!(file = %file_name, "game saved");
                    Ok(SaveFile { path, file_name })
                }
                ack => {
                    warn!(?ack, reply = reply.display_text(), "save not acknowledged");
                    Err(AppError::Save(format!(
                        "interpreter did not confirm the save: {}",
                        reply.display_text()
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Restore the session's game from `file_name` in its save directory.
    ///
    /// The name is validated before the interpreter is touched. Returns the
    /// interpreter's reply to the restore.
    ///
    /// # Errors
    ///
    /// - `AppError::PathEscape` — the name resolves outside the save directory.
    /// - `AppError::NotFound` — no such save file.
    /// - `AppError::NoStory` — no story selected.
    /// - `AppError::SessionDead` — the interpreter is gone or exits mid-dialog.
    /// - `AppError::Restore` — the interpreter did not acknowledge the restore.
    pub async fn restore(&self, session: &Session, file_name: &str) -> Result<Reply> {
        let span = info_span!("restore_game", session_key = %session.key());
        async move {
            let path = resolve_save_path(session.save_dir(), file_name)?;

            let mut guard = session.lock().await;
            if !guard.has_story() {
                return Err(AppError::NoStory("select a game before restoring".into()));
            }

            guard.drain_output();
            let prompt = exchange(&mut guard, "restore").await?;
            debug!(prompt = prompt.display_text(), "restore prompt");

            let reply = exchange(&mut guard, &path.to_string_lossy()).await?;
            match self.matcher.classify(&reply.text) {
                Acknowledgement::Success => {
                    info!(file = %file_name.trim(), "game restored");
                    Ok(reply)
                }
                ack => {
                    warn!(?ack, reply = reply.display_text(), "restore not acknowledged");
                    Err(AppError::Restore(format!(
                        "interpreter did not confirm the restore: {}",
                        reply.display_text()
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Names of the session's save files, newest first.
    ///
    /// A missing save directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be listed.
    pub fn list_saves(&self, session: &Session) -> Result<Vec<String>> {
        list_dir(session.save_dir(), &self.suffix)
    }
}

/// Send one dialog step; an interpreter exit aborts the dialog.
async fn exchange(guard: &mut SessionGuard<'_>, line: &str) -> Result<Reply> {
    let reply = guard.send(line).await?;
    if reply.process_exited() {
        return Err(AppError::SessionDead(
            "the interpreter exited mid-dialog".into(),
        ));
    }
    Ok(reply)
}

fn list_dir(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/*{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(suffix)
    );
    let entries = glob::glob(&pattern)
        .map_err(|err| AppError::Io(format!("invalid save pattern: {err}")))?;

    let mut saves: Vec<(SystemTime, String)> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| AppError::Io(format!("cannot list saves: {err}")))?;
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let modified = path
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        saves.push((modified, name));
    }

    saves.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(saves.into_iter().map(|(_, name)| name).collect())
}
