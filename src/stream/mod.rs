//! Worker output stream handling.
//!
//! Pure functions only: nothing here touches a process or the filesystem.

mod classifier;

pub use classifier::{COMPLETION_SENTINEL, classify_line, tool_summary};
