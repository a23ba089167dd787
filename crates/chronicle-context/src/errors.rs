//! Error types for context management.

use chronicle_events::EventStoreError;
use thiserror::Error;

/// Errors returned by the context subsystem.
///
/// Store failures are folded into the variants callers act on; anything
/// unexpected becomes [`ContextError::Internal`].
#[derive(Debug, Error)]
pub enum ContextError {
    /// Session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session has ended.
    #[error("session not active: {0}")]
    SessionNotActive(String),

    /// Referenced event does not exist.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Append referenced an unknown parent.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// Lost an append race; the head moved.
    #[error("sequence conflict on session {session_id}: expected head {expected}, found {actual}")]
    SequenceConflict {
        /// Session whose head moved.
        session_id: String,
        /// Head the append was based on.
        expected: String,
        /// Head actually stored.
        actual: String,
    },

    /// Operation not valid now (e.g. compaction already in flight).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The next turn cannot fit even after maximal compaction.
    #[error(
        "context overflow in session {session_id}: {projected_tokens} projected tokens, limit {token_limit}"
    )]
    ContextOverflow {
        /// Affected session.
        session_id: String,
        /// Tokens the turn would need.
        projected_tokens: u64,
        /// Model limit.
        token_limit: u64,
    },

    /// The summarizer failed or timed out; nothing was persisted.
    #[error("summarization failed for session {session_id} at {tokens_before} tokens: {message}")]
    SummarizationFailed {
        /// Affected session.
        session_id: String,
        /// Window cost when summarization was attempted.
        tokens_before: u64,
        /// Summarizer error.
        message: String,
    },

    /// Unexpected store or accounting failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Whether retrying later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SequenceConflict { .. } | Self::InvalidOperation(_) | Self::SummarizationFailed { .. }
        )
    }
}

impl From<EventStoreError> for ContextError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            EventStoreError::SessionNotActive(id) => Self::SessionNotActive(id),
            EventStoreError::EventNotFound(id) => Self::EventNotFound(id),
            EventStoreError::InvalidParent(id) => Self::InvalidParent(id),
            EventStoreError::SequenceConflict {
                session_id,
                expected,
                actual,
            } => Self::SequenceConflict {
                session_id,
                expected,
                actual,
            },
            EventStoreError::InvalidOperation(msg) => Self::InvalidOperation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result alias for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
