//! Git worktree management for PRD isolation.
//!
//! Each PRD gets its own worktree with a dedicated branch, providing
//! complete isolation between concurrent loops.

mod manager;

pub use manager::{BRANCH_PREFIX, Worktree, WorktreeManager};
