//! Context window payloads.

use serde::{Deserialize, Serialize};

/// Payload for `context.cleared` events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextClearedPayload {
    /// Window cost before the clear.
    pub tokens_before: u64,
    /// Window cost after the clear (always 0 when written).
    pub tokens_after: u64,
    /// Why the context was cleared.
    pub reason: String,
}
