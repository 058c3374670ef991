//! prdloop - runs a coding agent against PRD documents until every story passes
//!
//! A PRD (`prd.json`) lists user stories. A loop spawns the worker once per
//! iteration with fresh context; the worker implements a story and flips its
//! `passes` flag. The manager runs many PRDs side by side, optionally each in
//! its own git worktree.

pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod prd;
pub mod runner;
pub mod stream;
pub mod worktree;

pub use error::{PrdloopError, Result};
