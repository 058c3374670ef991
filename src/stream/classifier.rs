//! Classifies worker stdout lines into loop events.
//!
//! The worker prints one JSON object per line. Only a few shapes matter:
//!
//! ```text
//! {"type":"assistant","message":{"content":[{"type":"text","text":"..."}]}}
//! {"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{...}}]}}
//! {"type":"tool_result", ...}
//! ```
//!
//! Everything else, including lines that are not JSON, is dropped. The output
//! format drifts between worker versions and must never take the loop down.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::EventKind;

/// Marker the worker prints once every story passes
pub const COMPLETION_SENTINEL: &str = "<promise>COMPLETE</promise>";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    Assistant { message: Message },
    User { message: Message },
    ToolResult {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Message {
    /// Kept raw so a malformed block only drops itself
    #[serde(default)]
    content: Vec<Value>,
}

impl Message {
    fn blocks(self) -> impl Iterator<Item = Block> {
        self.content
            .into_iter()
            .filter_map(|raw| serde_json::from_value(raw).ok())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {},
    #[serde(other)]
    Other,
}

/// Turn one stdout line into at most one event.
pub fn classify_line(line: &str) -> Option<EventKind> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamLine>(line).ok()? {
        StreamLine::Assistant { message } => message.blocks().find_map(classify_block),
        StreamLine::User { message } => message
            .blocks()
            .any(|b| matches!(b, Block::ToolResult {}))
            .then_some(EventKind::ToolResult),
        StreamLine::ToolResult {} => Some(EventKind::ToolResult),
        StreamLine::Other => None,
    }
}

fn classify_block(block: Block) -> Option<EventKind> {
    match block {
        Block::Text { text } if text.contains(COMPLETION_SENTINEL) => Some(EventKind::Complete),
        Block::Text { text } => Some(EventKind::AssistantText { text }),
        Block::ToolUse { name, input } => Some(EventKind::ToolStart { tool_name: name, input }),
        Block::ToolResult {} | Block::Other => None,
    }
}

/// Short description of a tool call's input for display.
pub fn tool_summary(input: &Value) -> Option<String> {
    const KEYS: [&str; 5] = ["file_path", "command", "pattern", "path", "url"];

    KEYS.iter()
        .find_map(|key| input.get(key).and_then(Value::as_str))
        .map(|s| {
            let first_line = s.lines().next().unwrap_or("");
            if first_line.chars().count() > 80 {
                let cut: String = first_line.chars().take(77).collect();
                format!("{}...", cut)
            } else {
                first_line.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_text() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Reading the PRD"}]}}"#;
        assert_eq!(
            classify_line(line),
            Some(EventKind::AssistantText {
                text: "Reading the PRD".into()
            })
        );
    }

    #[test]
    fn test_sentinel_yields_complete_only() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"All done <promise>COMPLETE</promise>"}]}}"#;
        assert_eq!(classify_line(line), Some(EventKind::Complete));
    }

    #[test]
    fn test_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"cargo test"}}]}}"#;
        assert_eq!(
            classify_line(line),
            Some(EventKind::ToolStart {
                tool_name: "Bash".into(),
                input: json!({"command": "cargo test"}),
            })
        );
    }

    #[test]
    fn test_first_block_wins() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"tool_use","name":"Read","input":{}},{"type":"text","text":"later"}]}}"#;
        assert!(matches!(
            classify_line(line),
            Some(EventKind::ToolStart { tool_name, .. }) if tool_name == "Read"
        ));
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","input":{}},{"type":"text","text":"<promise>COMPLETE</promise>"}]}}"#;
        assert_eq!(classify_line(line), Some(EventKind::Complete));

        let user = r#"{"type":"user","message":{"content":[{"type":"text"},{"type":"tool_result","tool_use_id":"t1"}]}}"#;
        assert_eq!(classify_line(user), Some(EventKind::ToolResult));
    }

    #[test]
    fn test_tool_result_type() {
        assert_eq!(
            classify_line(r#"{"type":"tool_result","content":"ok"}"#),
            Some(EventKind::ToolResult)
        );
    }

    #[test]
    fn test_user_message_carrying_tool_result() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#;
        assert_eq!(classify_line(line), Some(EventKind::ToolResult));
    }

    #[test]
    fn test_ignored_lines() {
        assert_eq!(classify_line(""), None);
        assert_eq!(classify_line("not json at all"), None);
        assert_eq!(classify_line(r#"{"type":"system","subtype":"init"}"#), None);
        assert_eq!(classify_line(r#"{"type":"result","result":"done"}"#), None);
        assert_eq!(classify_line(r#"{"no_type":true}"#), None);
        assert_eq!(classify_line(r#"{"type":"assistant","message":{"content":[]}}"#), None);
    }

    #[test]
    fn test_classification_is_repeatable() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"same"}]}}"#;
        assert_eq!(classify_line(line), classify_line(line));
    }

    #[test]
    fn test_tool_summary() {
        assert_eq!(tool_summary(&json!({"file_path": "a.rs"})), Some("a.rs".into()));
        assert_eq!(tool_summary(&json!({"command": "ls\npwd"})), Some("ls".into()));
        assert_eq!(tool_summary(&json!({"other": 1})), None);
        let long = "x".repeat(100);
        assert_eq!(tool_summary(&json!({ "pattern": long })).unwrap().len(), 80);
    }
}
