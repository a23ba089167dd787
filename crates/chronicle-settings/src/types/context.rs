//! Token budget and compaction settings.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Token budget for a session's effective context window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Model context window size in tokens.
    pub token_limit: u64,
    /// Usage ratio (0.0–1.0) at which compaction is suggested.
    pub warn_threshold: f64,
    /// Usage ratio (0.0–1.0) at which a turn recommends compaction first.
    pub critical_threshold: f64,
    /// Smallest window size reachable by compacting everything.
    ///
    /// Admission control uses this to decide whether a turn could fit
    /// after a maximal compaction.
    pub min_post_compaction_tokens: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            token_limit: 200_000,
            warn_threshold: 0.8,
            critical_threshold: 0.95,
            min_post_compaction_tokens: 2_000,
        }
    }
}

impl ContextSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.token_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "context.tokenLimit must be positive".into(),
            ));
        }
        if !(self.warn_threshold > 0.0 && self.warn_threshold <= 1.0) {
            return Err(SettingsError::InvalidValue(format!(
                "context.warnThreshold must be in (0, 1], got {}",
                self.warn_threshold
            )));
        }
        if !(self.critical_threshold >= self.warn_threshold && self.critical_threshold <= 1.0) {
            return Err(SettingsError::InvalidValue(format!(
                "context.criticalThreshold must be in [warnThreshold, 1], got {}",
                self.critical_threshold
            )));
        }
        if self.min_post_compaction_tokens >= self.token_limit {
            return Err(SettingsError::InvalidValue(
                "context.minPostCompactionTokens must be below tokenLimit".into(),
            ));
        }
        Ok(())
    }
}

/// Compaction engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Upper bound on a single summarizer call.
    pub summarizer_timeout_ms: u64,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            summarizer_timeout_ms: 30_000,
        }
    }
}

impl CompactionSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.summarizer_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "compaction.summarizerTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}
