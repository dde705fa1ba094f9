//! Containment checks for player-supplied save file names.
//!
//! A restore name is checked lexically before anything touches the
//! filesystem or the interpreter, then checked again after symlinks are
//! resolved.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Lexically resolve `candidate` against `save_dir` without touching disk.
///
/// Any `..` segment is rejected, wherever it appears. An absolute candidate
/// is accepted only if it already lies inside `save_dir`.
///
/// # Errors
///
/// Returns `AppError::PathEscape` if the name is empty, contains `..`, or
/// lies outside `save_dir`.
pub fn lexical_save_path(save_dir: &Path, candidate: &str) -> Result<PathBuf> {
    let candidate = Path::new(candidate.trim());
    if candidate.as_os_str().is_empty() {
        return Err(AppError::PathEscape("empty save name".into()));
    }

    let relative = if candidate.is_absolute() {
        candidate.strip_prefix(save_dir).map_err(|_| {
            AppError::PathEscape(format!("{} is outside the save directory", candidate.display()))
        })?
    } else {
        candidate
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::ParentDir => {
                return Err(AppError::PathEscape(format!(
                    "{} contains a parent-directory segment",
                    candidate.display()
                )));
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathEscape(format!(
                    "{} is outside the save directory",
                    candidate.display()
                )));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(AppError::PathEscape(format!(
            "{} names the save directory itself",
            candidate.display()
        )));
    }

    Ok(save_dir.join(normalized))
}

/// Resolve `candidate` to an existing save file inside `save_dir`.
///
/// Performs the lexical check, then requires the file to exist, then
/// canonicalizes both sides so a symlink pointing outside is rejected.
///
/// # Errors
///
/// - `AppError::PathEscape` — the name or its symlink target escapes.
/// - `AppError::NotFound` — no such file in the save directory.
pub fn resolve_save_path(save_dir: &Path, candidate: &str) -> Result<PathBuf> {
    let lexical = lexical_save_path(save_dir, candidate)?;

    if !lexical.is_file() {
        return Err(AppError::NotFound(format!("no save named '{}'", candidate.trim())));
    }

    let root = save_dir
        .canonicalize()
        .map_err(|err| AppError::NotFound(format!("save directory unavailable: {err}")))?;
    let canonical = lexical
        .canonicalize()
        .map_err(|err| AppError::NotFound(format!("cannot resolve save: {err}")))?;

    if !canonical.starts_with(&root) {
        return Err(AppError::PathEscape(
            "save file links outside the save directory".into(),
        ));
    }

    Ok(canonical)
}
