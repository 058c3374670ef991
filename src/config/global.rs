//! Global configuration.
//!
//! Loaded from .prdloop.yml or ~/.config/prdloop/prdloop.yml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::manager::ManagerConfig;
use crate::runner::{DEFAULT_PROMPT, DEFAULT_WORKER, RetryConfig, WorkerConfig};

/// Project config file name
pub const PROJECT_CONFIG: &str = ".prdloop.yml";

/// Global configuration for prdloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Worker process settings.
    pub worker: WorkerSection,

    /// Loop settings.
    #[serde(rename = "loop")]
    pub loop_: LoopSection,

    /// Retry policy for failed iterations.
    pub retry: RetrySection,

    /// Worktree layout.
    pub worktrees: WorktreesSection,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .prdloop.yml in current directory
    /// 3. ~/.config/prdloop/prdloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(PROJECT_CONFIG);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", PROJECT_CONFIG);
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", PROJECT_CONFIG, e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("prdloop").join("prdloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.loop_.max_iterations == 0 {
            eyre::bail!("loop.max-iterations must be > 0");
        }
        if self.worker.command.trim().is_empty() {
            eyre::bail!("worker.command must not be empty");
        }
        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            program: self.worker.command.clone(),
            args: self.worker.args.clone(),
            prompt: self.worker.prompt.clone(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            delays: self.retry.delays_ms.iter().copied().map(Duration::from_millis).collect(),
            enabled: self.retry.enabled,
        }
    }

    /// Manager configuration rooted at `base_dir`.
    pub fn manager_config(&self, base_dir: impl Into<PathBuf>) -> ManagerConfig {
        ManagerConfig {
            base_dir: base_dir.into(),
            max_iterations: self.loop_.max_iterations,
            worker: self.worker_config(),
            retry: self.retry_config(),
        }
    }
}

/// Worker process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Worker binary.
    pub command: String,

    /// Full argument list; replaces the standard one when set.
    pub args: Option<Vec<String>>,

    /// Instructions given to the worker each iteration.
    pub prompt: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            command: DEFAULT_WORKER.to_string(),
            args: None,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopSection {
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// Retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySection {
    pub enabled: bool,

    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff per retry in milliseconds; the last value repeats.
    #[serde(rename = "delays-ms")]
    pub delays_ms: Vec<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            delays_ms: vec![5_000, 15_000, 30_000],
        }
    }
}

/// Worktree layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorktreesSection {
    /// Directory holding one worktree per PRD, relative to the repo root.
    pub dir: PathBuf,
}

impl Default for WorktreesSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".prdloop/worktrees"),
        }
    }
}
