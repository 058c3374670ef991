//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive one or more PRDs concurrently
//! - status: show a PRD's stories and progress log
//! - worktrees: list/prune/orphans
//! - merge: merge a finished PRD branch back
//! - reconcile: re-author a PRD without losing progress

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// prdloop - run a coding agent against PRDs until every story passes
#[derive(Parser, Debug)]
#[command(name = "prdloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run loops for one or more PRD files concurrently
    Run {
        /// Paths to prd.json files
        #[arg(required = true)]
        prds: Vec<PathBuf>,

        /// Give each PRD its own git worktree and branch
        #[arg(short, long)]
        worktrees: bool,

        /// Override the configured iteration budget
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,
    },

    /// Show completion, next story and progress for a PRD
    Status {
        /// Path to prd.json
        prd: PathBuf,
    },

    /// Worktree maintenance
    Worktrees {
        #[command(subcommand)]
        command: WorktreeCommands,
    },

    /// Merge a PRD's branch into the current branch
    Merge {
        /// PRD name (its branch is prdloop/<name>)
        name: String,
    },

    /// Replace a PRD's definition while keeping story progress
    Reconcile {
        /// Existing prd.json carrying progress
        old: PathBuf,

        /// New prd.json definition; rewritten in place with progress merged
        new: PathBuf,
    },
}

/// Worktree subcommands
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum WorktreeCommands {
    /// List git worktrees
    List,

    /// Drop records of worktrees whose directories are gone
    Prune,

    /// Show worktree directories not known to git
    Orphans,
}
