//! Workload lifecycle state as tracked by the manager.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one registered workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// Registered, never started
    Ready,
    /// A loop is iterating
    Running,
    /// Resumable: paused by request, or the run ended without finishing the PRD
    Paused,
    /// Stop requested, loop still winding down
    Stopping,
    /// Stopped by request
    Stopped,
    /// Every story passes
    Complete,
    /// The run failed
    Error,
}

impl LoopState {
    /// Returns true if a loop task is live for this workload
    pub fn is_active(&self) -> bool {
        matches!(self, LoopState::Running | LoopState::Stopping)
    }

    /// Returns true if the workload can be resumed
    pub fn is_resumable(&self) -> bool {
        matches!(self, LoopState::Paused)
    }

    /// Returns true if the workload is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Complete | LoopState::Error)
    }
}

/// Snapshot of one registered workload.
///
/// The manager hands out clones of this; holding one never blocks the
/// instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopInstance {
    pub name: String,
    pub prd_path: PathBuf,
    /// Isolated worktree the loop runs in, if any
    pub worktree_dir: Option<PathBuf>,
    pub branch: Option<String>,
    pub state: LoopState,
    /// Iteration of the current (or last) run
    pub iteration: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LoopInstance {
    pub fn new(name: impl Into<String>, prd_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            prd_path: prd_path.into(),
            worktree_dir: None,
            branch: None,
            state: LoopState::Ready,
            iteration: 0,
            started_at: None,
            last_error: None,
        }
    }

    pub fn with_worktree(mut self, dir: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        self.worktree_dir = Some(dir.into());
        self.branch = Some(branch.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(LoopState::Running.is_active());
        assert!(LoopState::Stopping.is_active());
        assert!(!LoopState::Paused.is_active());

        assert!(LoopState::Paused.is_resumable());
        assert!(!LoopState::Stopped.is_resumable());

        assert!(LoopState::Complete.is_terminal());
        assert!(LoopState::Error.is_terminal());
        assert!(LoopState::Stopped.is_terminal());
        assert!(!LoopState::Ready.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&LoopState::Stopping).unwrap(), "\"stopping\"");
        let state: LoopState = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(state, LoopState::Complete);
    }

    #[test]
    fn test_new_instance_is_ready() {
        let instance = LoopInstance::new("auth", "/work/auth/prd.json");
        assert_eq!(instance.state, LoopState::Ready);
        assert_eq!(instance.iteration, 0);
        assert!(instance.worktree_dir.is_none());
        assert!(instance.started_at.is_none());
    }

    #[test]
    fn test_with_worktree() {
        let instance = LoopInstance::new("auth", "prd.json").with_worktree("/wt/auth", "prdloop/auth");
        assert_eq!(instance.worktree_dir, Some(PathBuf::from("/wt/auth")));
        assert_eq!(instance.branch.as_deref(), Some("prdloop/auth"));
    }
}
