//! Loop runner module - drives a single PRD with a fresh worker process per
//! iteration.
//!
//! - `PrdLoop` spawns the worker, streams its output and decides when to stop
//! - `LoopConfig`, `WorkerConfig` and `RetryConfig` configure it

mod config;
mod loop_runner;

pub use config::{DEFAULT_PROMPT, DEFAULT_WORKER, LoopConfig, RetryConfig, WorkerConfig};
pub use loop_runner::{LOG_FILE, PrdLoop};
