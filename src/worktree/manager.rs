//! WorktreeManager handles git worktree operations for PRD isolation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{PrdloopError, Result};

/// Branches tried, in order, when the remote HEAD is unknown
const DEFAULT_BRANCH_CANDIDATES: [&str; 2] = ["main", "master"];

/// Prefix for worktree branches created by [`WorktreeManager::branch_name`]
pub const BRANCH_PREFIX: &str = "prdloop";

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub path: PathBuf,
    /// None for a detached HEAD
    pub branch: Option<String>,
    pub head: String,
    pub prunable: bool,
}

/// Manages git worktrees for PRD isolation.
///
/// Each PRD gets its own worktree with a dedicated branch so concurrent loops
/// never share a working tree.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    /// Main repository root
    repo_root: PathBuf,
    /// Directory holding one worktree per PRD
    base_path: PathBuf,
}

impl WorktreeManager {
    /// Create a new WorktreeManager.
    ///
    /// # Arguments
    /// * `repo_root` - Path to the main git repository
    /// * `base_path` - Directory where worktrees are created
    pub fn new(repo_root: impl Into<PathBuf>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            base_path: base_path.into(),
        }
    }

    /// Get the repo root path.
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Get the base path for worktrees.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Conventional worktree path for a PRD.
    pub fn workspace_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Conventional branch name for a PRD.
    pub fn branch_name(name: &str) -> String {
        format!("{}/{}", BRANCH_PREFIX, name)
    }

    /// Create (or reuse) the worktree at `path` checked out on `branch`.
    ///
    /// A valid worktree already on `branch` is left untouched. Anything else
    /// at `path` is discarded and rebuilt; stale worktrees are not migrated.
    pub async fn create(&self, path: &Path, branch: &str) -> Result<PathBuf> {
        if path.exists() {
            let current = self.current_branch(path).await;
            let reusable = match &current {
                Ok(Some(name)) if name == branch => self.is_registered(path).await?,
                _ => false,
            };
            if reusable {
                log::debug!("Reusing worktree {} on {}", path.display(), branch);
                return Ok(path.to_path_buf());
            }

            match current {
                Ok(current) => {
                    log::info!(
                        "Rebuilding stale worktree {} (on {:?}, want {})",
                        path.display(),
                        current,
                        branch
                    );
                }
                Err(e) => {
                    log::info!("Rebuilding invalid worktree {}: {}", path.display(), e);
                }
            }
            self.teardown(path).await?;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if !self.branch_exists(branch).await? {
            let base = self.default_branch().await?;
            git(&self.repo_root, &["branch", branch, &base]).await?;
            log::info!("Created branch {} from {}", branch, base);
        }

        git(&self.repo_root, &["worktree", "add", path_arg(path)?, branch]).await?;
        log::info!("Created worktree {} on {}", path.display(), branch);

        Ok(path.to_path_buf())
    }

    /// Remove a worktree and optionally delete its branch.
    pub async fn remove(&self, path: &Path, delete_branch: bool) -> Result<()> {
        let branch = if delete_branch {
            self.current_branch(path).await.ok().flatten()
        } else {
            None
        };

        if path.exists() {
            git(&self.repo_root, &["worktree", "remove", "--force", path_arg(path)?]).await?;
        }

        if let Some(branch) = branch
            && let Err(e) = git(&self.repo_root, &["branch", "-D", &branch]).await
        {
            // Branch deletion failure is not fatal (may not exist)
            log::warn!("Failed to delete branch {}: {}", branch, e);
        }

        Ok(())
    }

    /// Merge `branch` into the branch checked out at the repo root.
    ///
    /// On conflicts the merge is aborted so the tree is left clean, and the
    /// conflicting paths come back in [`PrdloopError::MergeConflict`].
    pub async fn merge_branch(&self, branch: &str) -> Result<()> {
        let merge_err = match git(&self.repo_root, &["merge", "--no-edit", branch]).await {
            Ok(_) => {
                log::info!("Merged {} into {}", branch, self.repo_root.display());
                return Ok(());
            }
            Err(e) => e,
        };

        let files = self.conflicted_files().await.unwrap_or_default();
        if files.is_empty() {
            return Err(merge_err);
        }

        if let Err(e) = git(&self.repo_root, &["merge", "--abort"]).await {
            log::error!("Failed to abort merge of {}: {}", branch, e);
        }
        log::warn!("Merge of {} conflicted in {} file(s), aborted", branch, files.len());

        Err(PrdloopError::MergeConflict {
            branch: branch.to_string(),
            files,
        })
    }

    /// Workspace directories under the worktrees root of `base_dir`, keyed by
    /// PRD name. Whether one is truly orphaned is up to the caller.
    pub async fn detect_orphaned(base_dir: &Path) -> Result<HashMap<String, PathBuf>> {
        let mut found = HashMap::new();
        if !base_dir.exists() {
            return Ok(found);
        }

        let mut entries = tokio::fs::read_dir(base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                found.insert(name.to_string(), entry.path());
            }
        }

        Ok(found)
    }

    /// Drop git's records of worktrees whose directories are gone.
    pub async fn prune(&self) -> Result<()> {
        git(&self.repo_root, &["worktree", "prune"]).await?;
        Ok(())
    }

    /// All worktrees git knows about, including the main one.
    pub async fn list(&self) -> Result<Vec<Worktree>> {
        let stdout = git(&self.repo_root, &["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&stdout))
    }

    /// Branch checked out at `path`, None when detached.
    pub async fn current_branch(&self, path: &Path) -> Result<Option<String>> {
        let stdout = git(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let branch = stdout.trim();
        Ok((branch != "HEAD").then(|| branch.to_string()))
    }

    /// Repository's default branch.
    ///
    /// Uses origin's HEAD when there is one, then tries the usual names, then
    /// falls back to whatever the repo root has checked out.
    pub async fn default_branch(&self) -> Result<String> {
        if let Ok(stdout) = git(&self.repo_root, &["symbolic-ref", "refs/remotes/origin/HEAD"]).await
            && let Some(branch) = stdout.trim().strip_prefix("refs/remotes/origin/")
        {
            return Ok(branch.to_string());
        }

        for candidate in DEFAULT_BRANCH_CANDIDATES {
            if self.branch_exists(candidate).await? {
                return Ok(candidate.to_string());
            }
        }

        self.current_branch(&self.repo_root)
            .await?
            .ok_or_else(|| PrdloopError::Git("cannot determine default branch".to_string()))
    }

    /// Check if a local branch exists.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)])
            .current_dir(&self.repo_root)
            .output()
            .await?;
        Ok(output.status.success())
    }

    /// Number of commits on `branch` that `base` does not have.
    pub async fn commits_ahead(&self, base: &str, branch: &str) -> Result<u32> {
        let range = format!("{}..{}", base, branch);
        let stdout = git(&self.repo_root, &["rev-list", "--count", &range]).await?;
        stdout
            .trim()
            .parse()
            .map_err(|_| PrdloopError::Git(format!("unexpected rev-list output: {}", stdout.trim())))
    }

    async fn is_registered(&self, path: &Path) -> Result<bool> {
        let wanted = canonical(path);
        Ok(self.list().await?.iter().any(|wt| canonical(&wt.path) == wanted))
    }

    async fn conflicted_files(&self) -> Result<Vec<String>> {
        let stdout = git(&self.repo_root, &["diff", "--name-only", "--diff-filter=U"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn teardown(&self, path: &Path) -> Result<()> {
        if let Err(e) = git(&self.repo_root, &["worktree", "remove", "--force", path_arg(path)?]).await {
            log::debug!("worktree remove failed for {}: {}", path.display(), e);
        }
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        self.prune().await
    }
}

/// Run git in `dir`, returning stdout or the command's stderr as the error.
async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| PrdloopError::Git(format!("Failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PrdloopError::Git(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| PrdloopError::Git(format!("non UTF-8 path: {}", path.display())))
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parse_worktree_list(porcelain: &str) -> Vec<Worktree> {
    let mut worktrees = Vec::new();
    let mut current: Option<Worktree> = None;

    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            current = Some(Worktree {
                path: PathBuf::from(path),
                branch: None,
                head: String::new(),
                prunable: false,
            });
            continue;
        }

        let Some(wt) = current.as_mut() else {
            continue;
        };

        if let Some(head) = line.strip_prefix("HEAD ") {
            wt.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch ") {
            wt.branch = Some(branch.strip_prefix("refs/heads/").unwrap_or(branch).to_string());
        } else if line == "prunable" || line.starts_with("prunable ") {
            wt.prunable = true;
        }
    }

    if let Some(wt) = current {
        worktrees.push(wt);
    }

    worktrees
}
