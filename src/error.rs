//! Error types for prdloop
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// All error types that can occur in prdloop
#[derive(Debug, Error)]
pub enum PrdloopError {
    /// PRD document does not exist on disk
    #[error("PRD not found: {}", .0.display())]
    PrdNotFound(PathBuf),

    /// PRD document exists but could not be parsed
    #[error("Invalid PRD {}: {reason}", .path.display())]
    InvalidPrd { path: PathBuf, reason: String },

    /// No workload registered under this name
    #[error("PRD not registered: {0}")]
    NotRegistered(String),

    /// A workload with this name is already registered
    #[error("PRD already registered: {0}")]
    AlreadyRegistered(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Worker process exited unsuccessfully
    #[error("Iteration {iteration} failed: worker exited with {status}")]
    IterationFailed { iteration: u32, status: String },

    /// Retries exhausted for an iteration
    #[error("Max retries ({retries}) exceeded: {source}")]
    MaxRetriesExceeded {
        retries: u32,
        #[source]
        source: Box<PrdloopError>,
    },

    /// Git command failed; carries the command's stderr
    #[error("Git error: {0}")]
    Git(String),

    /// Merge stopped on conflicts and was aborted
    #[error("Merge of {branch} conflicted in {} file(s): {}", .files.len(), .files.join(", "))]
    MergeConflict { branch: String, files: Vec<String> },

    /// Filesystem watch error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrdloopError {
    /// Conflicting paths when this is a merge conflict, empty otherwise.
    pub fn conflicting_files(&self) -> &[String] {
        match self {
            PrdloopError::MergeConflict { files, .. } => files,
            _ => &[],
        }
    }
}

/// Result type alias for prdloop operations
pub type Result<T> = std::result::Result<T, PrdloopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_registered_error() {
        let err = PrdloopError::NotRegistered("auth".to_string());
        assert_eq!(err.to_string(), "PRD not registered: auth");
    }

    #[test]
    fn test_invalid_state_error() {
        let err = PrdloopError::InvalidState("auth is already running".to_string());
        assert_eq!(err.to_string(), "Invalid state: auth is already running");
    }

    #[test]
    fn test_iteration_failed_error() {
        let err = PrdloopError::IterationFailed {
            iteration: 3,
            status: "exit status: 1".to_string(),
        };
        assert_eq!(err.to_string(), "Iteration 3 failed: worker exited with exit status: 1");
    }

    #[test]
    fn test_max_retries_wraps_source() {
        let inner = PrdloopError::IterationFailed {
            iteration: 1,
            status: "exit status: 2".to_string(),
        };
        let err = PrdloopError::MaxRetriesExceeded {
            retries: 3,
            source: Box::new(inner),
        };
        assert!(err.to_string().starts_with("Max retries (3) exceeded"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_merge_conflict_lists_files() {
        let err = PrdloopError::MergeConflict {
            branch: "prdloop/auth".to_string(),
            files: vec!["a.txt".to_string(), "b.txt".to_string()],
        };
        assert_eq!(err.conflicting_files().len(), 2);
        assert!(err.to_string().contains("a.txt, b.txt"));
    }

    #[test]
    fn test_conflicting_files_empty_for_other_errors() {
        let err = PrdloopError::Git("fatal: not a git repository".to_string());
        assert!(err.conflicting_files().is_empty());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PrdloopError = io_err.into();
        assert!(matches!(err, PrdloopError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: PrdloopError = json_err.into();
        assert!(matches!(err, PrdloopError::Json(_)));
    }
}
