//! Storage contract behind [`EventStore`](crate::EventStore).
//!
//! A backend is a flat append log indexed by event id, plus one
//! [`SessionRecord`] per session. Parent links are stored as ids, so tree
//! walks are index lookups. Backends never assign ids or sequences; they
//! only persist what the store hands them and guard the session head.

mod memory;

pub use memory::MemoryStorage;

use crate::errors::Result;
use crate::types::{SessionEvent, SessionRecord};

/// Durable append/read medium for session events.
///
/// Ordering is scoped to one session: the only shared mutable state is
/// each session's head pointer, advanced with a compare-and-swap in
/// [`append_batch`](Self::append_batch).
pub trait EventStorage: Send + Sync {
    /// Persist a new session together with its root event.
    ///
    /// Fails with `InvalidOperation` if the session id is taken.
    fn create_session(&self, record: &SessionRecord, root: &SessionEvent) -> Result<()>;

    /// Look up a session record.
    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Look up any event by id, regardless of session.
    fn get_event(&self, event_id: &str) -> Result<Option<SessionEvent>>;

    /// Atomically append a chain of events and advance the session head.
    ///
    /// `events[0]` must have `expected_head_id` as parent and each later
    /// event must have its predecessor as parent. If the stored head is not
    /// `expected_head_id` the call fails with `SequenceConflict` and nothing
    /// is written. On success every event becomes visible at once and the
    /// updated record is returned.
    fn append_batch(
        &self,
        session_id: &str,
        expected_head_id: &str,
        events: &[SessionEvent],
    ) -> Result<SessionRecord>;

    /// Events stored under `session_id`, ordered by sequence.
    fn list_session_events(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SessionEvent>>;

    /// Direct children of an event across all sessions, ordered by sequence.
    fn children(&self, event_id: &str) -> Result<Vec<SessionEvent>>;
}

/// Validate the chain shape of a batch before any backend writes it.
pub(crate) fn check_batch_shape(expected_head_id: &str, events: &[SessionEvent]) -> Result<()> {
    use crate::errors::EventStoreError;

    if events.is_empty() {
        return Err(EventStoreError::InvalidOperation(
            "append batch is empty".into(),
        ));
    }
    let mut parent = expected_head_id;
    for event in events {
        if event.parent_id.as_deref() != Some(parent) {
            return Err(EventStoreError::Internal(format!(
                "batch event {} does not chain from {parent}",
                event.id
            )));
        }
        parent = &event.id;
    }
    Ok(())
}
