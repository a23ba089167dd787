//! Settings type tree.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial JSON file deserializes with compiled defaults for missing keys.

mod context;
mod store;

pub use context::{CompactionSettings, ContextSettings};
pub use store::{StoreBackend, StoreSettings};

use chronicle_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChronicleSettings {
    /// Token budget and thresholds.
    pub context: ContextSettings,
    /// Compaction engine tuning.
    pub compaction: CompactionSettings,
    /// Event storage backend.
    pub store: StoreSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ChronicleSettings {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        self.compaction.validate()?;
        self.store.validate()?;
        if LogFormat::parse(&self.logging.format).is_none() {
            return Err(SettingsError::InvalidValue(format!(
                "unknown log format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// `"compact"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Parsed output format, falling back to compact.
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.format).unwrap_or_default()
    }
}
