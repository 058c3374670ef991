//! Manager module
//!
//! Runs many PRD loops side by side, tracks their lifecycle and merges their
//! events into one tagged stream.

mod loop_manager;

pub use loop_manager::{
    CompletionCallback, LOOP_EVENT_CAPACITY, MANAGER_EVENT_CAPACITY, Manager, ManagerConfig, ManagerEvent,
    PostCompletion, PostCompletionHook,
};
