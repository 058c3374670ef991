//! Configuration for a single PRD loop.

use std::path::PathBuf;
use std::time::Duration;

/// Worker binary invoked when nothing else is configured
pub const DEFAULT_WORKER: &str = "claude";

/// Instructions handed to the worker each iteration
pub const DEFAULT_PROMPT: &str = "Read prd.json and progress.txt in the current directory. \
Pick the highest priority story that does not pass, implement it, run the checks, \
set its passes flag in prd.json and append what you did to progress.txt. \
When every story passes, reply with <promise>COMPLETE</promise>.";

/// Backoff policy for failed iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Wait before each retry; the last entry repeats
    pub delays: Vec<Duration>,
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(30),
            ],
            enabled: true,
        }
    }
}

impl RetryConfig {
    /// A policy that fails on the first error.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1) as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or(Duration::ZERO)
    }
}

/// How to launch the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub program: String,
    /// Replaces the standard argument list when set
    pub args: Option<Vec<String>>,
    pub prompt: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_WORKER.to_string(),
            args: None,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Run `program` with exactly `args`.
    pub fn command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args: Some(args),
            prompt: String::new(),
        }
    }

    /// Run a shell script as the worker.
    pub fn script(script: impl Into<String>) -> Self {
        Self::command("sh", vec!["-c".to_string(), script.into()])
    }

    /// Arguments passed to the worker.
    pub fn command_args(&self) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            None => vec![
                "--print".to_string(),
                self.prompt.clone(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
        }
    }
}

/// Configuration for a [`PrdLoop`](super::PrdLoop).
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Worker directory; the PRD's directory when unset
    pub work_dir: Option<PathBuf>,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    /// Append-only output log; `<prd dir>/prdloop.log` when unset
    pub log_path: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            work_dir: None,
            worker: WorkerConfig::default(),
            retry: RetryConfig::default(),
            log_path: None,
        }
    }
}

impl LoopConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}
