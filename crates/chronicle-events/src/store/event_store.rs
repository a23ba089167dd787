//! High-level event store API.
//!
//! [`EventStore`] owns identity and ordering: it assigns event ids,
//! timestamps and sequences, then hands fully-formed events to the
//! [`EventStorage`] backend, whose head compare-and-swap provides the
//! optimistic concurrency check.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use chronicle_core::{EventId, SessionId, WorkspaceId};

use super::window::walk_effective_window;
use crate::errors::{EventStoreError, Result};
use crate::storage::{EventStorage, MemoryStorage};
use crate::types::payloads::{
    MessageDeletedPayload, SessionEndPayload, SessionForkPayload, SessionStartPayload,
};
use crate::types::{EventType, NewSessionEvent, SessionEvent, SessionEventPayload, SessionRecord};

/// Options for creating a new session.
#[derive(Clone, Debug, Default)]
pub struct CreateSessionOptions {
    /// Explicit session id; generated when `None`.
    pub session_id: Option<String>,
    /// Owning workspace; generated when `None`.
    pub workspace_id: Option<String>,
    /// Working directory recorded on `session.start`.
    pub working_directory: Option<String>,
    /// Model recorded on `session.start`.
    pub model: Option<String>,
    /// Title recorded on `session.start`.
    pub title: Option<String>,
}

/// Pagination for [`EventStore::history`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ListEventsOptions {
    /// Maximum events to return.
    pub limit: Option<usize>,
    /// Events to skip from the oldest.
    pub offset: Option<usize>,
}

/// Result of [`EventStore::fork`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkContext {
    /// The new session.
    pub new_session_id: String,
    /// Session that owns the fork point.
    pub parent_session_id: String,
    /// The `session.fork` event rooting the new session.
    pub fork_event_id: String,
    /// Ancestor chain of the fork point, root first, fork point last.
    pub parent_event_ids: Vec<String>,
}

/// An event with a pre-assigned id, waiting to be appended in a batch.
///
/// Pre-assigning ids lets later events in a batch reference earlier ones
/// (a `compact.summary` names its boundary).
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    /// Id the event will be stored under.
    pub id: String,
    /// Typed payload.
    pub payload: SessionEventPayload,
}

impl PendingEvent {
    /// Assign a fresh id to `payload`.
    pub fn new(payload: SessionEventPayload) -> Self {
        Self {
            id: EventId::new().into_inner(),
            payload,
        }
    }
}

/// Append-only, forkable session event store.
#[derive(Clone)]
pub struct EventStore {
    storage: Arc<dyn EventStorage>,
}

impl EventStore {
    /// Wrap a storage backend.
    pub fn new(storage: Arc<dyn EventStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// The underlying backend.
    pub fn storage(&self) -> &Arc<dyn EventStorage> {
        &self.storage
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session rooted at a `session.start` event with sequence 0.
    #[instrument(skip_all)]
    pub fn create_session(&self, opts: &CreateSessionOptions) -> Result<(SessionRecord, SessionEvent)> {
        let session_id = opts
            .session_id
            .clone()
            .unwrap_or_else(|| SessionId::new().into_inner());
        let workspace_id = opts
            .workspace_id
            .clone()
            .unwrap_or_else(|| WorkspaceId::new().into_inner());
        let now = now();

        let payload = SessionStartPayload {
            working_directory: opts.working_directory.clone(),
            model: opts.model.clone(),
            title: opts.title.clone(),
        };
        let root = SessionEvent {
            id: EventId::new().into_inner(),
            parent_id: None,
            session_id: session_id.clone(),
            workspace_id: workspace_id.clone(),
            timestamp: now.clone(),
            event_type: EventType::SessionStart,
            sequence: 0,
            payload: serde_json::to_value(&payload)?,
        };
        let record = SessionRecord {
            id: session_id,
            workspace_id,
            root_event_id: root.id.clone(),
            head_event_id: root.id.clone(),
            head_sequence: 0,
            parent_session_id: None,
            fork_from_event_id: None,
            created_at: now,
        };

        self.storage.create_session(&record, &root)?;
        info!(session_id = %record.id, workspace_id = %record.workspace_id, "session created");
        Ok((record, root))
    }

    /// Look up a session record.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.storage.get_session(session_id)
    }

    /// Look up a session record, failing with `SessionNotFound`.
    pub fn require_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.storage
            .get_session(session_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))
    }

    /// Current head event of a session.
    pub fn head(&self, session_id: &str) -> Result<SessionEvent> {
        let session = self.require_session(session_id)?;
        self.require_event(&session.head_event_id)
    }

    /// Whether the session still accepts appends.
    pub fn is_active(&self, session_id: &str) -> Result<bool> {
        Ok(self.head(session_id)?.event_type != EventType::SessionEnd)
    }

    /// Close a session with a `session.end` event.
    pub fn end_session(&self, session_id: &str, reason: Option<String>) -> Result<SessionEvent> {
        self.append(&NewSessionEvent::new(
            session_id,
            SessionEventPayload::SessionEnd(SessionEndPayload { reason }),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Look up any event by id.
    pub fn get_event(&self, event_id: &str) -> Result<Option<SessionEvent>> {
        self.storage.get_event(event_id)
    }

    fn require_event(&self, event_id: &str) -> Result<SessionEvent> {
        self.storage
            .get_event(event_id)?
            .ok_or_else(|| EventStoreError::EventNotFound(event_id.to_string()))
    }

    /// Append one event at the session head.
    ///
    /// When `parent_id` is set it must resolve (`InvalidParent`) and must be
    /// the current head (`SequenceConflict`). The sequence is always the
    /// head's sequence + 1.
    pub fn append(&self, event: &NewSessionEvent) -> Result<SessionEvent> {
        let pending = PendingEvent::new(event.payload.clone());
        let mut appended =
            self.append_batch(&event.session_id, event.parent_id.as_deref(), vec![pending])?;
        appended
            .pop()
            .ok_or_else(|| EventStoreError::Internal("append produced no event".into()))
    }

    /// Atomically append a chain of events at the session head.
    ///
    /// Either all events become visible, or none do.
    pub fn append_batch(
        &self,
        session_id: &str,
        expected_head: Option<&str>,
        pending: Vec<PendingEvent>,
    ) -> Result<Vec<SessionEvent>> {
        let session = self.require_session(session_id)?;

        if let Some(parent_id) = expected_head {
            if self.storage.get_event(parent_id)?.is_none() {
                return Err(EventStoreError::InvalidParent(parent_id.to_string()));
            }
            if parent_id != session.head_event_id {
                return Err(EventStoreError::SequenceConflict {
                    session_id: session_id.to_string(),
                    expected: parent_id.to_string(),
                    actual: session.head_event_id,
                });
            }
        }

        let head = self.require_event(&session.head_event_id)?;
        if head.event_type == EventType::SessionEnd {
            return Err(EventStoreError::SessionNotActive(session_id.to_string()));
        }

        let timestamp = now();
        let mut parent_id = head.id.clone();
        let mut sequence = head.sequence;
        let mut events = Vec::with_capacity(pending.len());
        for item in pending {
            sequence += 1;
            let event = SessionEvent {
                id: item.id,
                parent_id: Some(parent_id),
                session_id: session_id.to_string(),
                workspace_id: session.workspace_id.clone(),
                timestamp: timestamp.clone(),
                event_type: item.payload.event_type(),
                sequence,
                payload: item.payload.to_value()?,
            };
            parent_id = event.id.clone();
            events.push(event);
        }

        let _ = self.storage.append_batch(session_id, &head.id, &events)?;
        for event in &events {
            debug!(
                session_id,
                event_id = %event.id,
                event_type = %event.event_type,
                sequence = event.sequence,
                "event appended"
            );
        }
        Ok(events)
    }

    /// Retract a message by appending `message.deleted`.
    ///
    /// The target must be a message event on the session's chain.
    pub fn delete_message(
        &self,
        session_id: &str,
        target_event_id: &str,
        reason: Option<String>,
    ) -> Result<SessionEvent> {
        let target = self.require_event(target_event_id)?;
        if !target.event_type.is_message_type() {
            return Err(EventStoreError::InvalidOperation(format!(
                "cannot delete {} event {target_event_id}",
                target.event_type
            )));
        }
        let head = self.head(session_id)?;
        let on_chain = self
            .ancestors(&head.id)?
            .iter()
            .any(|e| e.id == target.id);
        if !on_chain {
            return Err(EventStoreError::InvalidOperation(format!(
                "event {target_event_id} is not part of session {session_id}"
            )));
        }

        self.append(&NewSessionEvent::new(
            session_id,
            SessionEventPayload::MessageDeleted(MessageDeletedPayload {
                target_event_id: target.id,
                target_type: target.event_type,
                reason,
            }),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Events stored under a session, oldest first.
    ///
    /// Only the session's own events are returned; inherited fork history
    /// is reachable through [`ancestors`](Self::ancestors).
    pub fn history(&self, session_id: &str, opts: &ListEventsOptions) -> Result<Vec<SessionEvent>> {
        let _ = self.require_session(session_id)?;
        self.storage
            .list_session_events(session_id, opts.limit, opts.offset.unwrap_or(0))
    }

    /// Ancestor chain of an event, root first, the event itself last.
    pub fn ancestors(&self, event_id: &str) -> Result<Vec<SessionEvent>> {
        let mut chain = Vec::new();
        let mut cursor = Some(event_id.to_string());
        while let Some(id) = cursor {
            let event = self.require_event(&id)?;
            cursor = event.parent_id.clone();
            chain.push(event);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Direct children of an event, across sessions.
    pub fn children(&self, event_id: &str) -> Result<Vec<SessionEvent>> {
        self.storage.children(event_id)
    }

    /// The session's effective context window, oldest first.
    pub fn effective_window(&self, session_id: &str) -> Result<Vec<SessionEvent>> {
        let session = self.require_session(session_id)?;
        walk_effective_window(self.storage.as_ref(), &session.head_event_id)
    }

    /// Ids of events retracted by `message.deleted` events in `events`.
    pub fn retracted_ids(events: &[SessionEvent]) -> HashSet<String> {
        events
            .iter()
            .filter(|e| e.event_type == EventType::MessageDeleted)
            .filter_map(|e| e.payload_str("targetEventId").map(ToOwned::to_owned))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Forks
    // ─────────────────────────────────────────────────────────────────────

    /// Branch a new session off `parent_event_id`.
    ///
    /// No events are copied: the new session's root `session.fork` event
    /// links back to the fork point, and window walks follow that link.
    #[instrument(skip(self))]
    pub fn fork(&self, parent_event_id: &str, new_session_id: &str) -> Result<ForkContext> {
        let parent = self
            .storage
            .get_event(parent_event_id)?
            .ok_or_else(|| EventStoreError::InvalidParent(parent_event_id.to_string()))?;
        let ancestors = self.ancestors(&parent.id)?;

        let payload = SessionForkPayload {
            source_session_id: parent.session_id.clone(),
            source_event_id: parent.id.clone(),
            name: None,
        };
        let now = now();
        let fork_event = SessionEvent {
            id: EventId::new().into_inner(),
            parent_id: Some(parent.id.clone()),
            session_id: new_session_id.to_string(),
            workspace_id: parent.workspace_id.clone(),
            timestamp: now.clone(),
            event_type: EventType::SessionFork,
            sequence: parent.sequence + 1,
            payload: serde_json::to_value(&payload)?,
        };
        let record = SessionRecord {
            id: new_session_id.to_string(),
            workspace_id: parent.workspace_id.clone(),
            root_event_id: fork_event.id.clone(),
            head_event_id: fork_event.id.clone(),
            head_sequence: fork_event.sequence,
            parent_session_id: Some(parent.session_id.clone()),
            fork_from_event_id: Some(parent.id.clone()),
            created_at: now,
        };
        self.storage.create_session(&record, &fork_event)?;

        info!(
            new_session_id,
            parent_session_id = %parent.session_id,
            fork_event_id = %fork_event.id,
            inherited = ancestors.len(),
            "session forked"
        );

        Ok(ForkContext {
            new_session_id: new_session_id.to_string(),
            parent_session_id: parent.session_id,
            fork_event_id: fork_event.id,
            parent_event_ids: ancestors.into_iter().map(|e| e.id).collect(),
        })
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::types::payloads::{AssistantMessagePayload, UserMessagePayload};
    use assert_matches::assert_matches;

    fn user(session_id: &str, text: &str) -> NewSessionEvent {
        NewSessionEvent::new(
            session_id,
            SessionEventPayload::MessageUser(UserMessagePayload::text(text)),
        )
    }

    fn assistant(session_id: &str, text: &str) -> NewSessionEvent {
        NewSessionEvent::new(
            session_id,
            SessionEventPayload::MessageAssistant(AssistantMessagePayload::text(text)),
        )
    }

    fn setup() -> (EventStore, String) {
        let store = EventStore::in_memory();
        let (record, _) = store
            .create_session(&CreateSessionOptions {
                session_id: Some("sess_a".into()),
                workspace_id: Some("ws_a".into()),
                ..Default::default()
            })
            .unwrap();
        (store, record.id)
    }

    #[test]
    fn create_session_roots_at_sequence_zero() {
        let (store, sid) = setup();
        let head = store.head(&sid).unwrap();
        assert_eq!(head.event_type, EventType::SessionStart);
        assert_eq!(head.sequence, 0);
        assert!(head.parent_id.is_none());
        assert!(head.id.starts_with("evt_"));
    }

    #[test]
    fn generated_session_ids() {
        let store = EventStore::in_memory();
        let (record, _) = store.create_session(&CreateSessionOptions::default()).unwrap();
        assert!(record.id.starts_with("sess_"));
        assert!(record.workspace_id.starts_with("ws_"));
    }

    #[test]
    fn append_assigns_next_sequence_and_links_head() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        let e1 = store.append(&user(&sid, "hi")).unwrap();
        let e2 = store.append(&assistant(&sid, "hello")).unwrap();
        assert_eq!(e1.sequence, 1);
        assert_eq!(e1.parent_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(e2.sequence, 2);
        assert_eq!(e2.parent_id.as_deref(), Some(e1.id.as_str()));
        assert_eq!(e2.workspace_id, "ws_a");
        assert_eq!(store.head(&sid).unwrap().id, e2.id);
    }

    #[test]
    fn unknown_parent_is_invalid_parent() {
        let (store, sid) = setup();
        let err = store.append(&user(&sid, "x").with_parent("evt_ghost")).unwrap_err();
        assert_matches!(err, EventStoreError::InvalidParent(id) if id == "evt_ghost");
    }

    #[test]
    fn stale_parent_is_sequence_conflict() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        store.append(&user(&sid, "first")).unwrap();
        let err = store.append(&user(&sid, "second").with_parent(root.id)).unwrap_err();
        assert_matches!(err, EventStoreError::SequenceConflict { .. });
    }

    #[test]
    fn pinned_parent_at_head_succeeds() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        let e1 = store.append(&user(&sid, "x").with_parent(root.id.clone())).unwrap();
        assert_eq!(e1.parent_id, Some(root.id));
    }

    #[test]
    fn unknown_session_not_found() {
        let store = EventStore::in_memory();
        let err = store.append(&user("sess_none", "x")).unwrap_err();
        assert_matches!(err, EventStoreError::SessionNotFound(_));
    }

    #[test]
    fn ended_session_rejects_appends() {
        let (store, sid) = setup();
        store.end_session(&sid, Some("done".into())).unwrap();
        assert!(!store.is_active(&sid).unwrap());
        let err = store.append(&user(&sid, "late")).unwrap_err();
        assert_matches!(err, EventStoreError::SessionNotActive(_));
    }

    #[test]
    fn batch_chains_events() {
        let (store, sid) = setup();
        let a = PendingEvent::new(SessionEventPayload::MessageUser(UserMessagePayload::text("a")));
        let b = PendingEvent::new(SessionEventPayload::MessageUser(UserMessagePayload::text("b")));
        let a_id = a.id.clone();
        let events = store.append_batch(&sid, None, vec![a, b]).unwrap();
        assert_eq!(events[0].id, a_id);
        assert_eq!(events[1].parent_id.as_deref(), Some(a_id.as_str()));
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn history_pages_oldest_first() {
        let (store, sid) = setup();
        for i in 0..5 {
            store.append(&user(&sid, &format!("m{i}"))).unwrap();
        }
        let all = store.history(&sid, &ListEventsOptions::default()).unwrap();
        assert_eq!(all.len(), 6);
        let page = store
            .history(&sid, &ListEventsOptions { limit: Some(2), offset: Some(2) })
            .unwrap();
        assert_eq!(page.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
        // restartable: same page twice
        let again = store
            .history(&sid, &ListEventsOptions { limit: Some(2), offset: Some(2) })
            .unwrap();
        assert_eq!(page, again);
    }

    #[test]
    fn history_of_missing_session() {
        let store = EventStore::in_memory();
        assert_matches!(
            store.history("nope", &ListEventsOptions::default()),
            Err(EventStoreError::SessionNotFound(_))
        );
    }

    #[test]
    fn fork_records_ancestor_chain() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        let e2 = store.append(&assistant(&sid, "b")).unwrap();
        store.append(&user(&sid, "after fork point")).unwrap();

        let ctx = store.fork(&e2.id, "sess_b").unwrap();
        assert_eq!(ctx.parent_session_id, sid);
        assert_eq!(ctx.new_session_id, "sess_b");
        assert_eq!(ctx.parent_event_ids, vec![root.id, e1.id, e2.id.clone()]);

        let fork_event = store.head("sess_b").unwrap();
        assert_eq!(fork_event.id, ctx.fork_event_id);
        assert_eq!(fork_event.event_type, EventType::SessionFork);
        assert_eq!(fork_event.parent_id.as_deref(), Some(e2.id.as_str()));
        assert_eq!(fork_event.sequence, e2.sequence + 1);

        let record = store.require_session("sess_b").unwrap();
        assert_eq!(record.parent_session_id.as_deref(), Some(sid.as_str()));
        assert_eq!(record.fork_from_event_id, Some(e2.id));
    }

    #[test]
    fn fork_does_not_copy_events() {
        let (store, sid) = setup();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        store.fork(&e1.id, "sess_b").unwrap();
        let own = store.history("sess_b", &ListEventsOptions::default()).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].event_type, EventType::SessionFork);
    }

    #[test]
    fn forked_window_inherits_parent_history() {
        let (store, sid) = setup();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        store.append(&user(&sid, "not inherited")).unwrap();
        store.fork(&e1.id, "sess_b").unwrap();
        let child_msg = store.append(&user("sess_b", "child")).unwrap();

        let window: Vec<_> = store
            .effective_window("sess_b")
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(window.len(), 4);
        assert_eq!(window[1], e1.id);
        assert_eq!(window[3], child_msg.id);
    }

    #[test]
    fn fork_from_unknown_event() {
        let (store, _) = setup();
        assert_matches!(
            store.fork("evt_ghost", "sess_b"),
            Err(EventStoreError::InvalidParent(_))
        );
    }

    #[test]
    fn fork_into_existing_session_rejected() {
        let (store, sid) = setup();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        assert_matches!(
            store.fork(&e1.id, &sid),
            Err(EventStoreError::InvalidOperation(_))
        );
    }

    #[test]
    fn children_include_fork_roots() {
        let (store, sid) = setup();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        let e2 = store.append(&user(&sid, "b")).unwrap();
        let ctx = store.fork(&e1.id, "sess_b").unwrap();
        let ids: Vec<_> = store.children(&e1.id).unwrap().into_iter().map(|e| e.id).collect();
        assert!(ids.contains(&e2.id));
        assert!(ids.contains(&ctx.fork_event_id));
    }

    #[test]
    fn delete_message_appends_retraction() {
        let (store, sid) = setup();
        let e1 = store.append(&user(&sid, "oops")).unwrap();
        let del = store.delete_message(&sid, &e1.id, Some("typo".into())).unwrap();
        assert_eq!(del.event_type, EventType::MessageDeleted);
        assert_eq!(del.payload_str("targetEventId"), Some(e1.id.as_str()));
        assert_eq!(del.payload_str("targetType"), Some("message.user"));
        // original is untouched
        assert!(store.get_event(&e1.id).unwrap().is_some());
        let window = store.effective_window(&sid).unwrap();
        assert!(EventStore::retracted_ids(&window).contains(&e1.id));
    }

    #[test]
    fn delete_rejects_non_messages_and_foreign_events() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        assert_matches!(
            store.delete_message(&sid, &root.id, None),
            Err(EventStoreError::InvalidOperation(_))
        );

        let (other, _) = store
            .create_session(&CreateSessionOptions::default())
            .unwrap();
        let foreign = store.append(&user(&other.id, "elsewhere")).unwrap();
        assert_matches!(
            store.delete_message(&sid, &foreign.id, None),
            Err(EventStoreError::InvalidOperation(_))
        );
    }

    #[test]
    fn ancestors_root_first() {
        let (store, sid) = setup();
        let root = store.head(&sid).unwrap();
        let e1 = store.append(&user(&sid, "a")).unwrap();
        let chain: Vec<_> = store.ancestors(&e1.id).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(chain, vec![root.id, e1.id]);
    }
}
