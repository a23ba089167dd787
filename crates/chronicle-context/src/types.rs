//! Result types returned by context operations.
//!
//! All serialize as camelCase JSON for the RPC surface.

use chronicle_events::EventType;
use chronicle_events::payloads::TodoItem;
use serde::Serialize;

use crate::tokens::TokenRole;

/// Usage band relative to the configured thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// Below the warn threshold.
    Normal,
    /// At or above warn.
    Warning,
    /// At or above critical.
    Critical,
    /// At or above the limit.
    Exceeded,
}

/// Input/output token totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    /// Tokens sent to the model.
    pub input: u64,
    /// Tokens produced by the model.
    pub output: u64,
}

impl TokenTotals {
    /// `input + output`.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Configured warn/critical ratios.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Warn ratio.
    pub warn: f64,
    /// Critical ratio.
    pub critical: f64,
}

/// Point-in-time view of a session's context usage.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Session measured.
    pub session_id: String,
    /// Rolling totals of the effective window.
    pub tokens_used: TokenTotals,
    /// Model limit.
    pub token_limit: u64,
    /// Usage as a percentage of the limit.
    pub usage_percent: f64,
    /// Usage band.
    pub threshold_level: ThresholdLevel,
    /// Thresholds in effect.
    pub thresholds: Thresholds,
    /// User and assistant messages in the window.
    pub message_count: u64,
}

/// One counted event in the effective window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowEntry {
    /// Event id.
    pub event_id: String,
    /// Event type.
    pub event_type: EventType,
    /// Budget side.
    pub role: TokenRole,
    /// Memoized cost.
    pub token_cost: u64,
}

/// Snapshot plus the per-event breakdown.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedContextSnapshot {
    /// Aggregate view.
    #[serde(flatten)]
    pub snapshot: ContextSnapshot,
    /// Counted events, oldest first.
    pub entries: Vec<WindowEntry>,
    /// Head the snapshot was taken at.
    pub head_event_id: String,
}

/// First and last events covered by a compaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRange {
    /// Oldest event in the window.
    pub from_event_id: String,
    /// Head when the window was read.
    pub to_event_id: String,
    /// Events in the window.
    pub event_count: usize,
}

/// Candidate compaction, computed without touching the log.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionPreview {
    /// Session previewed.
    pub session_id: String,
    /// Head the preview was computed against.
    pub basis_head_event_id: String,
    /// Summary that confirm would commit.
    pub candidate_summary: String,
    /// Window cost now.
    pub estimated_tokens_before: u64,
    /// Cost of the summary that would replace it.
    pub estimated_tokens_after: u64,
    /// `after / before`.
    pub compression_ratio: f64,
    /// Window the summary replaces.
    pub affected_event_range: EventRange,
    /// Decisions extracted by the summarizer.
    pub key_decisions: Vec<String>,
    /// Files the window touched.
    pub files_modified: Vec<String>,
}

/// Outcome of a committed compaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    /// Always true on the success path.
    pub success: bool,
    /// Boundary event id.
    pub boundary_event_id: String,
    /// Summary event id.
    pub summary_event_id: String,
    /// Summary text that was committed.
    pub summary: String,
    /// Window cost before.
    pub tokens_before: u64,
    /// Window cost after.
    pub tokens_after: u64,
    /// `after / before`.
    pub compression_ratio: f64,
    /// Whether the preview was stale and the summary recomputed.
    pub regenerated: bool,
    /// Window the summary replaced.
    pub range: EventRange,
}

/// Pre-turn admission verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreTurnValidation {
    /// The turn fits, possibly after compaction.
    pub can_proceed: bool,
    /// Compact before running the turn.
    pub recommend_compaction: bool,
    /// Current window cost.
    pub current_tokens: u64,
    /// `current + estimated response`.
    pub projected_tokens: u64,
    /// Model limit.
    pub token_limit: u64,
    /// Floor a compaction is assumed to leave behind.
    pub min_post_compaction_tokens: u64,
}

/// Outcome of a context clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearContextResult {
    /// Always true on the success path.
    pub success: bool,
    /// The appended `context.cleared` event.
    pub marker_event_id: String,
    /// Window cost before.
    pub tokens_before: u64,
    /// Window cost after (0).
    pub tokens_after: u64,
    /// Open todos from the cleared window.
    pub cleared_todos: Vec<TodoItem>,
}

/// Compression ratio guarded against an empty window.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compression_ratio(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 1.0;
    }
    after as f64 / before as f64
}
