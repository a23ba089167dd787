//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChronicleSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CHRONICLE_*` environment overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ChronicleSettings, StoreBackend};

/// Directory holding chronicle's user files (`~/.chronicle`).
pub fn chronicle_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chronicle")
}

/// Resolve the path to the settings file (`~/.chronicle/settings.json`).
pub fn settings_path() -> PathBuf {
    chronicle_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChronicleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<ChronicleSettings> {
    let defaults = serde_json::to_value(ChronicleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChronicleSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHRONICLE_*` environment variable overrides.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, keeping the file/default value.
pub fn apply_env_overrides(settings: &mut ChronicleSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides_with(
    settings: &mut ChronicleSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = EnvReader { lookup };

    // ── Context budget ──────────────────────────────────────────────
    if let Some(v) = env.u64("CHRONICLE_TOKEN_LIMIT", 1_000, 10_000_000) {
        settings.context.token_limit = v;
    }
    if let Some(v) = env.ratio("CHRONICLE_WARN_THRESHOLD") {
        settings.context.warn_threshold = v;
    }
    if let Some(v) = env.ratio("CHRONICLE_CRITICAL_THRESHOLD") {
        settings.context.critical_threshold = v;
    }
    if let Some(v) = env.u64("CHRONICLE_MIN_POST_COMPACTION_TOKENS", 0, 10_000_000) {
        settings.context.min_post_compaction_tokens = v;
    }

    // ── Compaction ──────────────────────────────────────────────────
    if let Some(v) = env.u64("CHRONICLE_SUMMARIZER_TIMEOUT_MS", 1_000, 600_000) {
        settings.compaction.summarizer_timeout_ms = v;
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("CHRONICLE_STORE_BACKEND") {
        match serde_json::from_value::<StoreBackend>(Value::String(v.to_lowercase())) {
            Ok(backend) => settings.store.backend = backend,
            Err(_) => tracing::warn!(key = "CHRONICLE_STORE_BACKEND", value = %v, "unknown store backend, ignoring"),
        }
    }
    if let Some(v) = env.string("CHRONICLE_DB_PATH") {
        settings.store.path = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CHRONICLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CHRONICLE_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a ratio in `(0, 1]`.
pub fn parse_ratio(val: &str) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n > 0.0 && n <= 1.0).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn ratio(&self, name: &str) -> Option<f64> {
        let val = (self.lookup)(name)?;
        let result = parse_ratio(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid ratio env var, ignoring");
        }
        result
    }
}
