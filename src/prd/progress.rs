//! Parser for the worker's append-only progress log.
//!
//! Sections look like:
//!
//! ```text
//! ## 2025-01-14 - US-003
//! - Added the login form
//! - Learned: the API wants camelCase
//! ---
//! ```
//!
//! Headers that don't match `YYYY-MM-DD - <storyId>` (e.g. `## Codebase
//! Patterns`) open a section that is skipped.

use std::path::Path;

use chrono::NaiveDate;

use crate::error::Result;

/// One session's notes for a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub story_id: String,
    pub date: NaiveDate,
    pub content: String,
}

const SEPARATOR: &str = "---";

/// Parse every dated story section out of a progress log.
pub fn parse_progress(text: &str) -> Vec<ProgressEntry> {
    let mut entries = Vec::new();
    let mut current: Option<(String, NaiveDate, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_end();

        if let Some(header) = trimmed.strip_prefix("## ") {
            if let Some(entry) = current.take() {
                entries.push(finish(entry));
            }
            current = parse_header(header).map(|(id, date)| (id, date, Vec::new()));
            continue;
        }

        if trimmed.trim() == SEPARATOR {
            if let Some(entry) = current.take() {
                entries.push(finish(entry));
            }
            continue;
        }

        if let Some((_, _, lines)) = current.as_mut() {
            lines.push(trimmed);
        }
    }

    if let Some(entry) = current.take() {
        entries.push(finish(entry));
    }

    entries
}

/// Read and parse a progress log. A missing file has no entries.
pub fn load_progress(path: impl AsRef<Path>) -> Result<Vec<ProgressEntry>> {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(text) => Ok(parse_progress(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Entries for one story, oldest first.
pub fn entries_for_story<'a>(entries: &'a [ProgressEntry], story_id: &str) -> Vec<&'a ProgressEntry> {
    entries.iter().filter(|e| e.story_id == story_id).collect()
}

fn parse_header(header: &str) -> Option<(String, NaiveDate)> {
    let (date, story_id) = header.split_once(" - ")?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let story_id = story_id.trim();
    if story_id.is_empty() {
        return None;
    }
    Some((story_id.to_string(), date))
}

fn finish((story_id, date, lines): (String, NaiveDate, Vec<&str>)) -> ProgressEntry {
    ProgressEntry {
        story_id,
        date,
        content: lines.join("\n").trim().to_string(),
    }
}
