//! Summarizer collaborator.
//!
//! The [`CompactionEngine`](crate::CompactionEngine) hands the effective
//! window, minus retracted messages, to a [`Summarizer`] and commits
//! whatever narrative comes back. Model-backed summarizers live outside
//! this crate. [`KeywordSummarizer`] is a deterministic fallback that needs
//! no model.

use async_trait::async_trait;
use chronicle_events::{EventType, SessionEvent};
use serde::Serialize;
use serde_json::Value;

use crate::constants::KEYWORD_USER_REQUEST_LIMIT;

// =============================================================================
// Summarizer Trait
// =============================================================================

/// Structured summarizer output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    /// Narrative that replaces the window.
    pub narrative: String,
    /// Decisions worth carrying forward.
    pub key_decisions: Vec<String>,
    /// Files the window touched.
    pub files_modified: Vec<String>,
}

/// Produces a summary of an effective window.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `window` (oldest first).
    async fn summarize(&self, window: &[SessionEvent]) -> Result<SummaryResult, SummarizerError>;
}

/// Errors that can occur during summarization.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// The call did not finish in time.
    #[error("summarizer timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The summarizer returned unusable output.
    #[error("failed to parse summarizer response: {reason}")]
    ParseError {
        /// Why parsing failed.
        reason: String,
    },

    /// The call failed.
    #[error("summarizer call failed: {message}")]
    CallFailed {
        /// Error message.
        message: String,
    },
}

// =============================================================================
// Keyword Summarizer
// =============================================================================

/// Deterministic summarizer built from keyword extraction.
///
/// Quotes user requests, picks the first sentence of each assistant reply as
/// a topic, and collects tool names and file paths from tool calls. A prior
/// `compact.summary` in the window is carried forward so repeated
/// compactions do not lose earlier context.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordSummarizer;

#[async_trait]
impl Summarizer for KeywordSummarizer {
    async fn summarize(&self, window: &[SessionEvent]) -> Result<SummaryResult, SummarizerError> {
        let mut earlier = None;
        let mut requests = Vec::new();
        let mut topics: Vec<String> = Vec::new();
        let mut tools: Vec<String> = Vec::new();
        let mut files: Vec<String> = Vec::new();

        for event in window {
            match event.event_type {
                EventType::CompactSummary => {
                    earlier = event.payload_str("summary").map(ToOwned::to_owned);
                }
                EventType::MessageUser => {
                    let text = content_text(event.payload.get("content"));
                    if !text.is_empty() {
                        requests.push(truncate(&text, KEYWORD_USER_REQUEST_LIMIT));
                    }
                }
                EventType::MessageAssistant => {
                    let text = content_text(event.payload.get("content"));
                    if let Some(first) = text.split('.').next() {
                        push_unique(&mut topics, truncate(first.trim(), 80));
                    }
                }
                EventType::ToolCall => {
                    if let Some(name) = event.payload_str("name") {
                        push_unique(&mut tools, name.to_string());
                    }
                    if let Some(path) = event.payload.get("arguments").and_then(file_argument) {
                        push_unique(&mut files, path.to_string());
                    }
                }
                _ => {}
            }
        }

        let mut parts = Vec::new();
        if let Some(earlier) = earlier {
            parts.push(format!("Earlier: {earlier}"));
        }
        if requests.is_empty() {
            parts.push(format!("({} events summarized)", window.len()));
        } else {
            parts.push(format!("The user made {} requests.", requests.len()));
            parts.push(format!("Key requests: {}", requests.join("; ")));
        }
        if !topics.is_empty() {
            parts.push(format!("Topics: {}", topics.join("; ")));
        }
        if !tools.is_empty() {
            parts.push(format!("Tools used: {}", tools.join(", ")));
        }
        if !files.is_empty() {
            parts.push(format!("Files touched: {}", files.join(", ")));
        }

        Ok(SummaryResult {
            narrative: parts.join(" "),
            key_decisions: Vec::new(),
            files_modified: files,
        })
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !item.is_empty() && !list.contains(&item) {
        list.push(item);
    }
}

fn file_argument(arguments: &Value) -> Option<&str> {
    arguments
        .get("file_path")
        .or_else(|| arguments.get("path"))
        .and_then(Value::as_str)
}

// =============================================================================
// Text helpers
// =============================================================================

/// Plain text of a message `content` value (string or block array).
pub(crate) fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncate to at most `max_len` bytes, appending "..." when cut.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let end = floor_boundary(s, max_len.saturating_sub(3));
    format!("{}...", &s[..end])
}
