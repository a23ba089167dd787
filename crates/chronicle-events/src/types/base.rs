//! The [`SessionEvent`] struct and its append/bookkeeping companions.
//!
//! Events are stored flat: base fields at the top level and a `payload`
//! holding the canonical JSON of the typed payload. Typed read access goes
//! through [`SessionEvent::typed_payload()`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generated::{EventType, SessionEventPayload};

/// A persisted session event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Globally unique event ID (`evt_<uuid v7>`).
    pub id: String,
    /// Parent event ID (`None` only for a session root).
    pub parent_id: Option<String>,
    /// Session this event belongs to.
    pub session_id: String,
    /// Workspace this event belongs to.
    pub workspace_id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Position along the root-to-node path; parent's sequence + 1.
    pub sequence: i64,
    /// Event-specific data.
    pub payload: Value,
}

impl SessionEvent {
    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Request to append one event.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSessionEvent {
    /// Target session.
    pub session_id: String,
    /// Expected head; `None` chains from whatever the head is at write time.
    pub parent_id: Option<String>,
    /// Typed payload (also fixes the event type).
    pub payload: SessionEventPayload,
}

impl NewSessionEvent {
    /// Append `payload` at the session's current head.
    pub fn new(session_id: impl Into<String>, payload: SessionEventPayload) -> Self {
        Self {
            session_id: session_id.into(),
            parent_id: None,
            payload,
        }
    }

    /// Pin the append to a specific parent (optimistic head check).
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Event type of the payload.
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Per-session bookkeeping kept alongside the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session ID.
    pub id: String,
    /// Owning workspace.
    pub workspace_id: String,
    /// First event of this session (`session.start` or `session.fork`).
    pub root_event_id: String,
    /// Newest event on the session's chain.
    pub head_event_id: String,
    /// Sequence of the head event.
    pub head_sequence: i64,
    /// Session this one was forked from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    /// Event in the parent session the fork branches from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_from_event_id: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
}
