//! # chronicle-events
//!
//! Append-only, tree-structured log of session events.
//!
//! - **Types**: [`EventType`], [`SessionEvent`], typed payloads via [`SessionEventPayload`]
//! - **Storage**: the [`EventStorage`] contract with [`MemoryStorage`] and
//!   [`SqliteStorage`] backends (r2d2 pool, WAL, versioned migrations)
//! - **Store**: [`EventStore`] assigns ids and sequences, forks sessions, and
//!   derives each session's effective context window
//!
//! Events are never mutated or physically deleted. Retraction is an appended
//! `message.deleted` event; compaction is an appended boundary/summary pair.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod storage;
pub mod store;
pub mod types;

pub use errors::{EventStoreError, Result};
pub use sqlite::SqliteStorage;
pub use storage::{EventStorage, MemoryStorage};
pub use store::{
    CreateSessionOptions, EventStore, ForkContext, ListEventsOptions, PendingEvent,
    walk_effective_window,
};
pub use types::{
    EventType, NewSessionEvent, SessionEvent, SessionEventPayload, SessionRecord, ALL_EVENT_TYPES,
};
pub use types::payloads;

use std::sync::Arc;

use chronicle_settings::{StoreBackend, StoreSettings};

/// Build the storage backend selected by `settings`.
pub fn open_storage(settings: &StoreSettings) -> Result<Arc<dyn EventStorage>> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StoreBackend::Sqlite => {
            let path = settings.db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EventStoreError::Internal(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            let config = sqlite::ConnectionConfig::from(settings);
            Ok(Arc::new(SqliteStorage::open(&path.to_string_lossy(), &config)?))
        }
    }
}
