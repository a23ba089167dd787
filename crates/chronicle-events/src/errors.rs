//! Error types for the event store subsystem.
//!
//! [`EventStoreError`] is returned by every storage backend and by
//! [`EventStore`](crate::EventStore). The concurrency variants
//! (`SequenceConflict`, `InvalidParent`) are distinct so callers can decide
//! between retrying and reporting a bug.

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session has ended and accepts no further events.
    #[error("session not active: {0}")]
    SessionNotActive(String),

    /// Requested event was not found.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Append referenced a parent event that does not exist.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// The session head moved between read and write.
    #[error("sequence conflict on session {session_id}: expected head {expected}, found {actual}")]
    SequenceConflict {
        /// Session whose head moved.
        session_id: String,
        /// Head the writer based its append on.
        expected: String,
        /// Head actually stored.
        actual: String,
    },

    /// Invalid operation on the event store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;
