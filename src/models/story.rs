//! Story catalogue entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A selectable game module. Immutable once the catalogue is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    name: String,
    abbrev: String,
    path: PathBuf,
}

impl Story {
    /// Construct a catalogue entry.
    #[must_use]
    pub fn new(name: impl Into<String>, abbrev: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            abbrev: abbrev.into(),
            path: path.into(),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short code used to select the story.
    #[must_use]
    pub fn abbrev(&self) -> &str {
        &self.abbrev
    }

    /// Story file handed to the interpreter.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ordered, read-only list of stories loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stories: Vec<Arc<Story>>,
}

impl Catalog {
    /// Build a catalogue preserving the given order.
    #[must_use]
    pub fn new(stories: Vec<Story>) -> Self {
        Self {
            stories: stories.into_iter().map(Arc::new).collect(),
        }
    }

    /// Look up a story by abbreviation, case-insensitively.
    #[must_use]
    pub fn by_abbrev(&self, abbrev: &str) -> Option<Arc<Story>> {
        self.stories
            .iter()
            .find(|story| story.abbrev.eq_ignore_ascii_case(abbrev))
            .cloned()
    }

    /// Iterate in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Story>> {
        self.stories.iter()
    }

    /// Number of stories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Whether the catalogue has no stories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }
}
