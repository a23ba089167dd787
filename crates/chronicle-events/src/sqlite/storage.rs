//! `SQLite` implementation of the [`EventStorage`] contract.
//!
//! Events and session records live in two tables. Every batch append runs
//! in one `IMMEDIATE` transaction that re-checks the session head before
//! inserting, so a boundary and its summary commit together or not at all.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;
use tracing::debug;

use super::connection::{self, ConnectionConfig, ConnectionPool};
use super::migrations;
use crate::errors::{EventStoreError, Result};
use crate::storage::{EventStorage, check_batch_shape};
use crate::types::{EventType, SessionEvent, SessionRecord};

const EVENT_COLUMNS: &str =
    "id, parent_id, session_id, workspace_id, timestamp, type, sequence, payload";

const SESSION_COLUMNS: &str = "id, workspace_id, root_event_id, head_event_id, head_sequence, \
     parent_session_id, fork_from_event_id, created_at";

/// [`EventStorage`] backed by a pooled `SQLite` database.
///
/// Batches are written inside a `BEGIN IMMEDIATE` transaction so the head
/// check and the inserts cannot interleave with another writer.
pub struct SqliteStorage {
    pool: ConnectionPool,
}

impl SqliteStorage {
    /// Open (or create) a database file and run pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        Self::with_pool(pool)
    }

    /// Private in-memory database, mainly for tests.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::with_pool(pool)
    }

    /// Wrap an existing pool, running pending migrations on it.
    pub fn with_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = migrations::run_migrations(&conn)?;
        debug!(applied, "sqlite event storage ready");
        drop(conn);
        Ok(Self { pool })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

struct EventRow {
    id: String,
    parent_id: Option<String>,
    session_id: String,
    workspace_id: String,
    timestamp: String,
    event_type: String,
    sequence: i64,
    payload: Value,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            session_id: row.get(2)?,
            workspace_id: row.get(3)?,
            timestamp: row.get(4)?,
            event_type: row.get(5)?,
            sequence: row.get(6)?,
            payload: row.get(7)?,
        })
    }

    fn into_event(self) -> Result<SessionEvent> {
        let event_type = EventType::from_str(&self.event_type).map_err(EventStoreError::Internal)?;
        Ok(SessionEvent {
            id: self.id,
            parent_id: self.parent_id,
            session_id: self.session_id,
            workspace_id: self.workspace_id,
            timestamp: self.timestamp,
            event_type,
            sequence: self.sequence,
            payload: self.payload,
        })
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        root_event_id: row.get(2)?,
        head_event_id: row.get(3)?,
        head_sequence: row.get(4)?,
        parent_session_id: row.get(5)?,
        fork_from_event_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_events(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SessionEvent>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, EventRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EventRow::into_event).collect()
}

fn insert_event(conn: &Connection, event: &SessionEvent) -> Result<()> {
    let _ = conn.execute(
        &format!("INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            event.id,
            event.parent_id,
            event.session_id,
            event.workspace_id,
            event.timestamp,
            event.event_type.as_str(),
            event.sequence,
            event.payload,
        ],
    )?;
    Ok(())
}

fn event_exists(conn: &Connection, event_id: &str) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM events WHERE id = ?1", [event_id], |_| Ok(()))
        .optional()?
        .is_some())
}

// ─────────────────────────────────────────────────────────────────────────────
// EventStorage
// ─────────────────────────────────────────────────────────────────────────────

impl EventStorage for SqliteStorage {
    fn create_session(&self, record: &SessionRecord, root: &SessionEvent) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", [&record.id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(EventStoreError::InvalidOperation(format!(
                "session already exists: {}",
                record.id
            )));
        }
        if let Some(parent) = &root.parent_id {
            if !event_exists(&tx, parent)? {
                return Err(EventStoreError::InvalidParent(parent.clone()));
            }
        }

        let _ = tx.execute(
            &format!(
                "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                record.id,
                record.workspace_id,
                record.root_event_id,
                record.head_event_id,
                record.head_sequence,
                record.parent_session_id,
                record.fork_from_event_id,
                record.created_at,
            ],
        )?;
        insert_event(&tx, root)?;
        tx.commit()?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [session_id],
                session_from_row,
            )
            .optional()?)
    }

    fn get_event(&self, event_id: &str) -> Result<Option<SessionEvent>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [event_id],
                EventRow::from_row,
            )
            .optional()?;
        row.map(EventRow::into_event).transpose()
    }

    fn append_batch(
        &self,
        session_id: &str,
        expected_head_id: &str,
        events: &[SessionEvent],
    ) -> Result<SessionRecord> {
        check_batch_shape(expected_head_id, events)?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record = tx
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [session_id],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))?;

        if record.head_event_id != expected_head_id {
            return Err(EventStoreError::SequenceConflict {
                session_id: session_id.to_string(),
                expected: expected_head_id.to_string(),
                actual: record.head_event_id,
            });
        }

        for event in events {
            insert_event(&tx, event)?;
            record.head_event_id.clone_from(&event.id);
            record.head_sequence = event.sequence;
        }

        let _ = tx.execute(
            "UPDATE sessions SET head_event_id = ?1, head_sequence = ?2 WHERE id = ?3",
            params![record.head_event_id, record.head_sequence, session_id],
        )?;
        tx.commit()?;
        Ok(record)
    }

    fn list_session_events(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SessionEvent>> {
        let conn = self.pool.get()?;
        // SQLite treats LIMIT -1 as unbounded
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        query_events(
            &conn,
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 \
                 ORDER BY sequence ASC LIMIT ?2 OFFSET ?3"
            ),
            params![session_id, limit, offset],
        )
    }

    fn children(&self, event_id: &str) -> Result<Vec<SessionEvent>> {
        let conn = self.pool.get()?;
        query_events(
            &conn,
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE parent_id = ?1 ORDER BY sequence ASC, rowid ASC"
            ),
            [event_id],
        )
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn event(id: &str, parent: Option<&str>, session: &str, seq: i64, ty: EventType) -> SessionEvent {
        SessionEvent {
            id: id.into(),
            parent_id: parent.map(Into::into),
            session_id: session.into(),
            workspace_id: "ws_1".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            event_type: ty,
            sequence: seq,
            payload: json!({"content": id}),
        }
    }

    fn record(session: &str, root: &str, seq: i64) -> SessionRecord {
        SessionRecord {
            id: session.into(),
            workspace_id: "ws_1".into(),
            root_event_id: root.into(),
            head_event_id: root.into(),
            head_sequence: seq,
            parent_session_id: None,
            fork_from_event_id: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn setup() -> SqliteStorage {
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .create_session(
                &record("s1", "e0", 0),
                &event("e0", None, "s1", 0, EventType::SessionStart),
            )
            .unwrap();
        storage
    }

    #[test]
    fn round_trips_events() {
        let storage = setup();
        let e1 = event("e1", Some("e0"), "s1", 1, EventType::MessageUser);
        storage.append_batch("s1", "e0", &[e1.clone()]).unwrap();
        assert_eq!(storage.get_event("e1").unwrap().unwrap(), e1);
        assert!(storage.get_event("missing").unwrap().is_none());
    }

    #[test]
    fn batch_updates_head_record() {
        let storage = setup();
        let updated = storage
            .append_batch(
                "s1",
                "e0",
                &[
                    event("e1", Some("e0"), "s1", 1, EventType::CompactBoundary),
                    event("e2", Some("e1"), "s1", 2, EventType::CompactSummary),
                ],
            )
            .unwrap();
        assert_eq!(updated.head_event_id, "e2");
        assert_eq!(storage.get_session("s1").unwrap().unwrap().head_sequence, 2);
    }

    #[test]
    fn stale_head_rolls_back() {
        let storage = setup();
        storage
            .append_batch("s1", "e0", &[event("e1", Some("e0"), "s1", 1, EventType::MessageUser)])
            .unwrap();
        let err = storage
            .append_batch("s1", "e0", &[event("e9", Some("e0"), "s1", 1, EventType::MessageUser)])
            .unwrap_err();
        assert_matches!(err, EventStoreError::SequenceConflict { .. });
        assert!(storage.get_event("e9").unwrap().is_none());
    }

    #[test]
    fn failed_insert_leaves_no_partial_batch() {
        let storage = setup();
        storage
            .append_batch("s1", "e0", &[event("e1", Some("e0"), "s1", 1, EventType::MessageUser)])
            .unwrap();
        // second event collides on (session_id, sequence)
        let err = storage
            .append_batch(
                "s1",
                "e1",
                &[
                    event("e2", Some("e1"), "s1", 2, EventType::CompactBoundary),
                    event("e3", Some("e2"), "s1", 1, EventType::CompactSummary),
                ],
            )
            .unwrap_err();
        assert_matches!(err, EventStoreError::Sqlite(_));
        assert!(storage.get_event("e2").unwrap().is_none());
        assert_eq!(storage.get_session("s1").unwrap().unwrap().head_event_id, "e1");
    }

    #[test]
    fn duplicate_session_rejected() {
        let storage = setup();
        let err = storage
            .create_session(
                &record("s1", "x0", 0),
                &event("x0", None, "s1", 0, EventType::SessionStart),
            )
            .unwrap_err();
        assert_matches!(err, EventStoreError::InvalidOperation(_));
    }

    #[test]
    fn fork_root_requires_existing_parent() {
        let storage = setup();
        let err = storage
            .create_session(
                &record("s2", "f0", 1),
                &event("f0", Some("ghost"), "s2", 1, EventType::SessionFork),
            )
            .unwrap_err();
        assert_matches!(err, EventStoreError::InvalidParent(_));
    }

    #[test]
    fn list_and_children() {
        let storage = setup();
        storage
            .append_batch(
                "s1",
                "e0",
                &[
                    event("e1", Some("e0"), "s1", 1, EventType::MessageUser),
                    event("e2", Some("e1"), "s1", 2, EventType::MessageAssistant),
                ],
            )
            .unwrap();
        let ids: Vec<_> = storage
            .list_session_events("s1", None, 1)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        let limited = storage.list_session_events("s1", Some(1), 0).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(storage.children("e1").unwrap()[0].id, "e2");
    }
}
