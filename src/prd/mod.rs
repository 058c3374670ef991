//! PRD (workload) documents.
//!
//! - `model`: the persisted document, story selection and progress merging
//! - `progress`: the worker's append-only progress log
//! - `watcher`: change notifications keyed on story status

mod model;
mod progress;
mod watcher;

pub use model::{Prd, Story, merge_progress, reconcile_file};
pub use progress::{ProgressEntry, entries_for_story, load_progress, parse_progress};
pub use watcher::{PrdWatcher, WatchEvent, has_status_changed};

/// Conventional file name of a PRD document
pub const PRD_FILE: &str = "prd.json";

/// Conventional file name of the progress log next to the PRD
pub const PROGRESS_FILE: &str = "progress.txt";
