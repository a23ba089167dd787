//! Event storage settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Which storage medium backs the event store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local log, lost on exit.
    #[default]
    Memory,
    /// File-backed `SQLite` database.
    Sqlite,
}

/// Event storage settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Storage medium.
    pub backend: StoreBackend,
    /// Database file path; defaults to `~/.chronicle/events.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout.
    pub busy_timeout_ms: u32,
    /// `SQLite` page cache size in KiB.
    pub cache_size_kib: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            pool_size: 16,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

impl StoreSettings {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => crate::loader::chronicle_home().join("events.db"),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be positive".into(),
            ));
        }
        Ok(())
    }
}
