//! Configuration system for prdloop.
//!
//! A single YAML file (`.prdloop.yml` or `~/.config/prdloop/prdloop.yml`)
//! that converts into the runtime configs of the runner and manager.

mod global;

pub use self::global::{
    GlobalConfig, LoopSection, PROJECT_CONFIG, RetrySection, WorkerSection, WorktreesSection,
};
