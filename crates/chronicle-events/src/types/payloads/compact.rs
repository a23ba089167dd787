//! Compaction payloads.
//!
//! A compaction appends a `compact.boundary` followed by a `compact.summary`
//! whose `boundary_event_id` points back at it. Readers only honour a
//! boundary once its summary is visible.

use serde::{Deserialize, Serialize};

/// Payload for `compact.boundary` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactBoundaryPayload {
    /// Window that was compacted.
    pub range: CompactRange,
    /// Window cost before compaction.
    pub original_tokens: u64,
    /// Estimated cost of the replacement summary.
    pub compacted_tokens: u64,
    /// Why compaction ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// First and last event ids of a compacted window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactRange {
    /// Oldest event in the window.
    pub from: String,
    /// Head at commit time.
    pub to: String,
}

/// Payload for `compact.summary` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSummaryPayload {
    /// Summary text.
    pub summary: String,
    /// Boundary this summary pairs with.
    pub boundary_event_id: String,
    /// Decisions captured by the summarizer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_decisions: Option<Vec<String>>,
    /// Files the summarized window touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
}
