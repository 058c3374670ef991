//! Events emitted by a running loop.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// What happened. The set is closed; consumers match it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A new iteration is about to spawn the worker
    IterationStart {
        /// Story the PRD points at as this iteration begins
        story_id: Option<String>,
    },
    /// Text the worker wrote
    AssistantText { text: String },
    /// Worker invoked a tool
    ToolStart { tool_name: String, input: Value },
    /// A tool call returned
    ToolResult,
    /// Worker signalled, or the PRD shows, that every story passes
    Complete,
    /// Iteration budget spent
    MaxIterationsReached { max: u32 },
    /// A failed iteration is being retried
    Retrying {
        attempt: u32,
        max_retries: u32,
        delay: Duration,
    },
    /// The run failed
    Error { message: String },
}

/// An event tagged with the iteration it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopEvent {
    pub iteration: u32,
    pub kind: EventKind,
}

impl LoopEvent {
    pub fn new(iteration: u32, kind: EventKind) -> Self {
        Self { iteration, kind }
    }

    /// True for events after which the run emits nothing else.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::MaxIterationsReached { .. } | EventKind::Error { .. }
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::IterationStart { story_id: Some(id) } => write!(f, "iteration start ({})", id),
            EventKind::IterationStart { story_id: None } => write!(f, "iteration start"),
            EventKind::AssistantText { text } => write!(f, "{}", text),
            EventKind::ToolStart { tool_name, input } => {
                write!(f, "tool {}", tool_name)?;
                match crate::stream::tool_summary(input) {
                    Some(summary) => write!(f, " {}", summary),
                    None => Ok(()),
                }
            }
            EventKind::ToolResult => write!(f, "tool result"),
            EventKind::Complete => write!(f, "complete"),
            EventKind::MaxIterationsReached { max } => write!(f, "max iterations ({}) reached", max),
            EventKind::Retrying {
                attempt,
                max_retries,
                delay,
            } => write!(f, "retrying {}/{} after {:?}", attempt, max_retries, delay),
            EventKind::Error { message } => write!(f, "error: {}", message),
        }
    }
}
