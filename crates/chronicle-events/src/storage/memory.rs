//! In-process storage backend.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{EventStorage, check_batch_shape};
use crate::errors::{EventStoreError, Result};
use crate::types::{SessionEvent, SessionRecord};

/// Append-only log held in memory.
///
/// Events live in one `Vec` in write order; maps hold positions into it.
/// A single `RwLock` makes each batch visible atomically.
#[derive(Default)]
pub struct MemoryStorage {
    log: RwLock<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    events: Vec<SessionEvent>,
    by_id: HashMap<String, usize>,
    by_session: HashMap<String, Vec<usize>>,
    children: HashMap<String, Vec<usize>>,
    sessions: HashMap<String, SessionRecord>,
}

impl MemoryLog {
    fn push(&mut self, event: SessionEvent) {
        let pos = self.events.len();
        let _ = self.by_id.insert(event.id.clone(), pos);
        self.by_session
            .entry(event.session_id.clone())
            .or_default()
            .push(pos);
        if let Some(parent) = &event.parent_id {
            self.children.entry(parent.clone()).or_default().push(pos);
        }
        self.events.push(event);
    }
}

impl MemoryStorage {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all sessions.
    pub fn event_count(&self) -> usize {
        self.log.read().events.len()
    }
}

impl EventStorage for MemoryStorage {
    fn create_session(&self, record: &SessionRecord, root: &SessionEvent) -> Result<()> {
        let mut log = self.log.write();
        if log.sessions.contains_key(&record.id) {
            return Err(EventStoreError::InvalidOperation(format!(
                "session already exists: {}",
                record.id
            )));
        }
        if log.by_id.contains_key(&root.id) {
            return Err(EventStoreError::Internal(format!(
                "duplicate event id: {}",
                root.id
            )));
        }
        if let Some(parent) = &root.parent_id {
            if !log.by_id.contains_key(parent) {
                return Err(EventStoreError::InvalidParent(parent.clone()));
            }
        }
        let _ = log.sessions.insert(record.id.clone(), record.clone());
        log.push(root.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.log.read().sessions.get(session_id).cloned())
    }

    fn get_event(&self, event_id: &str) -> Result<Option<SessionEvent>> {
        let log = self.log.read();
        Ok(log.by_id.get(event_id).map(|&pos| log.events[pos].clone()))
    }

    fn append_batch(
        &self,
        session_id: &str,
        expected_head_id: &str,
        events: &[SessionEvent],
    ) -> Result<SessionRecord> {
        check_batch_shape(expected_head_id, events)?;

        let mut log = self.log.write();
        let record = log
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))?;
        if record.head_event_id != expected_head_id {
            return Err(EventStoreError::SequenceConflict {
                session_id: session_id.to_string(),
                expected: expected_head_id.to_string(),
                actual: record.head_event_id,
            });
        }
        if let Some(dup) = events.iter().find(|e| log.by_id.contains_key(&e.id)) {
            return Err(EventStoreError::Internal(format!(
                "duplicate event id: {}",
                dup.id
            )));
        }

        let mut updated = record;
        for event in events {
            updated.head_event_id.clone_from(&event.id);
            updated.head_sequence = event.sequence;
            log.push(event.clone());
        }
        let _ = log.sessions.insert(session_id.to_string(), updated.clone());
        Ok(updated)
    }

    fn list_session_events(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SessionEvent>> {
        let log = self.log.read();
        let Some(positions) = log.by_session.get(session_id) else {
            return Ok(Vec::new());
        };
        let iter = positions.iter().skip(offset);
        let events = match limit {
            Some(n) => iter.take(n).map(|&pos| log.events[pos].clone()).collect(),
            None => iter.map(|&pos| log.events[pos].clone()).collect(),
        };
        Ok(events)
    }

    fn children(&self, event_id: &str) -> Result<Vec<SessionEvent>> {
        let log = self.log.read();
        Ok(log
            .children
            .get(event_id)
            .map(|positions| positions.iter().map(|&pos| log.events[pos].clone()).collect())
            .unwrap_or_default())
    }
}
