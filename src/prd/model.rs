//! PRD document and story types.
//!
//! The PRD on disk is shared with the worker process, which flips `passes` and
//! `inProgress` while it runs. Nothing here caches it: callers re-load on every
//! read and the last writer wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PrdloopError, Result};

/// One independently completable work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// Lower runs earlier
    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub passes: bool,

    /// Absent in the document until the worker first sets it
    #[serde(default, skip_serializing_if = "is_false")]
    pub in_progress: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Story {
    /// Create an unprogressed story.
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            priority,
            passes: false,
            in_progress: false,
            extra: Map::new(),
        }
    }

    /// True if the story has any recorded progress.
    pub fn has_progress(&self) -> bool {
        self.passes || self.in_progress
    }
}

/// The workload document (`prd.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    /// Derived from the directory holding the document
    #[serde(skip)]
    pub name: String,

    /// Title of the workload
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub user_stories: Vec<Story>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Prd {
    /// Create an empty PRD with the given name and title.
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            description: String::new(),
            user_stories: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style story append.
    pub fn with_story(mut self, story: Story) -> Self {
        self.user_stories.push(story);
        self
    }

    /// Load a PRD from disk, deriving its name from the containing directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PrdloopError::PrdNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut prd: Prd = serde_json::from_str(&content).map_err(|e| PrdloopError::InvalidPrd {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        prd.name = Self::name_from_path(path);
        Ok(prd)
    }

    /// Write the PRD as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }

    /// Workload name for a document path: the name of its parent directory.
    pub fn name_from_path(path: &Path) -> String {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "prd".to_string())
    }

    /// Directory containing the document, used as the default working directory.
    pub fn dir_of(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// True when every story passes. Vacuously true for zero stories.
    pub fn all_complete(&self) -> bool {
        self.user_stories.iter().all(|s| s.passes)
    }

    /// Story the worker should be on next.
    ///
    /// An in-progress story always wins (resuming interrupted work outranks
    /// priority). Otherwise the lowest-priority-value story that does not pass,
    /// ties going to document order.
    pub fn next_story(&self) -> Option<&Story> {
        if let Some(story) = self.user_stories.iter().find(|s| s.in_progress) {
            return Some(story);
        }

        self.user_stories
            .iter()
            .filter(|s| !s.passes)
            .reduce(|best, s| if s.priority < best.priority { s } else { best })
    }

    /// True if any story passes or is in progress.
    pub fn has_progress(&self) -> bool {
        self.user_stories.iter().any(Story::has_progress)
    }

    /// Number of passing stories.
    pub fn completed_count(&self) -> usize {
        self.user_stories.iter().filter(|s| s.passes).count()
    }

    /// Look up a story by id.
    pub fn story(&self, id: &str) -> Option<&Story> {
        self.user_stories.iter().find(|s| s.id == id)
    }
}

/// Carry recorded progress from `old` onto a re-authored `new`.
///
/// Stories are matched by id, never by position. Content always comes from
/// `new`; only `passes` and `in_progress` are copied. Stories missing from
/// `new` are dropped. Stories that only exist in `new` start with no progress.
pub fn merge_progress(old: &Prd, mut new: Prd) -> Prd {
    let recorded: HashMap<&str, (bool, bool)> = old
        .user_stories
        .iter()
        .map(|s| (s.id.as_str(), (s.passes, s.in_progress)))
        .collect();

    for story in &mut new.user_stories {
        let (passes, in_progress) = recorded.get(story.id.as_str()).copied().unwrap_or_default();
        story.passes = passes;
        story.in_progress = in_progress;
    }

    new
}

/// Re-read a PRD that was re-authored out of band and fold `old`'s progress
/// into it, writing the result back.
pub fn reconcile_file(path: impl AsRef<Path>, old: &Prd) -> Result<Prd> {
    let path = path.as_ref();
    let new = Prd::load(path)?;
    let merged = merge_progress(old, new);
    merged.save(path)?;
    log::info!(
        "Reconciled {}: {}/{} stories carry progress",
        path.display(),
        merged.user_stories.iter().filter(|s| s.has_progress()).count(),
        merged.user_stories.len()
    );
    Ok(merged)
}
