//! Domain types for prdloop
//!
//! - `LoopEvent` / `EventKind`: what a running loop reports
//! - `LoopState` / `LoopInstance`: per-workload lifecycle tracked by the manager

pub mod event;
pub mod instance;

pub use event::{EventKind, LoopEvent};
pub use instance::{LoopInstance, LoopState};
