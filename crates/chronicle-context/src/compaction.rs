//! Compaction engine.
//!
//! Per-session state machine:
//!
//! ```text
//! Idle → Previewing → Idle            (preview returned or discarded)
//! Idle → Committing → Idle            (committed or failed)
//! ```
//!
//! `preview` reads the effective window, calls the summarizer without
//! holding the session lock, and remembers the head it was computed
//! against. `confirm` takes the session lock, regenerates if the head has
//! moved since that basis, and commits `compact.boundary` +
//! `compact.summary` in one atomic storage batch. Readers therefore see
//! either the old window or the new one, never a boundary without its
//! summary.

use std::sync::Arc;
use std::time::Duration;

use chronicle_core::EventId;
use chronicle_events::payloads::{CompactBoundaryPayload, CompactRange, CompactSummaryPayload};
use chronicle_events::{
    EventStore, EventType, PendingEvent, SessionEvent, SessionEventPayload, walk_effective_window,
};
use chronicle_settings::CompactionSettings;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{ContextError, Result};
use crate::gate::{GatePhase, SessionGate};
use crate::summarizer::{Summarizer, SummarizerError};
use crate::tokens::TokenAccountant;
use crate::types::{CompactionPreview, CompactionResult, EventRange, compression_ratio};

/// Caller options for [`CompactionEngine::confirm`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOptions {
    /// Replace the generated summary with this text.
    pub edited_summary: Option<String>,
    /// Recorded on the boundary event.
    pub reason: Option<String>,
}

/// Drives preview/confirm for every session.
pub struct CompactionEngine {
    store: EventStore,
    accountant: Arc<TokenAccountant>,
    summarizer: Arc<dyn Summarizer>,
    gate: Arc<SessionGate>,
    summarizer_timeout: Duration,
    previews: DashMap<String, CompactionPreview>,
}

impl CompactionEngine {
    /// Engine sharing `gate` with the rest of the coordinator.
    pub fn new(
        store: EventStore,
        accountant: Arc<TokenAccountant>,
        summarizer: Arc<dyn Summarizer>,
        gate: Arc<SessionGate>,
        settings: &CompactionSettings,
    ) -> Self {
        Self {
            store,
            accountant,
            summarizer,
            gate,
            summarizer_timeout: Duration::from_millis(settings.summarizer_timeout_ms),
            previews: DashMap::new(),
        }
    }

    /// `rollingTotal / tokenLimit ≥ warnThreshold`.
    pub fn should_compact(&self, session_id: &str) -> Result<bool> {
        let totals = self.accountant.rolling_total(&self.store, session_id)?;
        let budget = self.accountant.budget();
        Ok(budget.token_limit > 0 && budget.usage_ratio(totals.total()) >= budget.warn_threshold)
    }

    /// Compute a candidate compaction without touching the log.
    pub async fn preview(&self, session_id: &str) -> Result<CompactionPreview> {
        let _phase = self.gate.enter(session_id, GatePhase::Previewing)?;
        let preview = self.generate(session_id).await?;
        info!(
            session_id,
            tokens_before = preview.estimated_tokens_before,
            tokens_after = preview.estimated_tokens_after,
            events = preview.affected_event_range.event_count,
            "compaction preview generated"
        );
        let _ = self.previews.insert(session_id.to_string(), preview.clone());
        Ok(preview)
    }

    /// Commit a compaction, regenerating first if the preview went stale.
    pub async fn confirm(&self, session_id: &str, opts: &ConfirmOptions) -> Result<CompactionResult> {
        let _phase = self.gate.enter(session_id, GatePhase::Committing)?;
        let _lock = self.gate.lock(session_id).await;

        let head = self.store.head(session_id)?;
        let cached = self.previews.remove(session_id).map(|(_, p)| p);
        let (preview, regenerated) = match cached {
            Some(preview) if preview.basis_head_event_id == head.id => (preview, false),
            stale => {
                if let Some(stale) = stale {
                    info!(
                        session_id,
                        basis = %stale.basis_head_event_id,
                        head = %head.id,
                        "session head advanced since preview, regenerating"
                    );
                }
                (self.generate(session_id).await?, true)
            }
        };
        if regenerated && opts.edited_summary.is_some() {
            warn!(session_id, "committing edited summary against a regenerated window");
        }

        let boundary_event_id = EventId::new().into_inner();
        let summary_text = opts
            .edited_summary
            .clone()
            .unwrap_or_else(|| preview.candidate_summary.clone());
        let summary_payload = CompactSummaryPayload {
            summary: summary_text.clone(),
            boundary_event_id: boundary_event_id.clone(),
            key_decisions: non_empty(&preview.key_decisions),
            files_modified: non_empty(&preview.files_modified),
        };
        let tokens_before = preview.estimated_tokens_before;
        let tokens_after = serde_json::to_value(&summary_payload)
            .map(|v| self.accountant.estimate(&v))
            .map_err(|e| ContextError::Internal(e.to_string()))?;
        if tokens_after >= tokens_before {
            return Err(ContextError::InvalidOperation(format!(
                "summary ({tokens_after} tokens) would not reduce context usage ({tokens_before} tokens)"
            )));
        }

        let boundary = PendingEvent {
            id: boundary_event_id.clone(),
            payload: SessionEventPayload::CompactBoundary(CompactBoundaryPayload {
                range: CompactRange {
                    from: preview.affected_event_range.from_event_id.clone(),
                    to: preview.affected_event_range.to_event_id.clone(),
                },
                original_tokens: tokens_before,
                compacted_tokens: tokens_after,
                reason: opts.reason.clone(),
            }),
        };
        let summary = PendingEvent::new(SessionEventPayload::CompactSummary(summary_payload));
        let summary_event_id = summary.id.clone();
        let superseded =
            walk_effective_window(self.store.storage().as_ref(), &preview.basis_head_event_id)?;

        let _ = self.store.append_batch(
            session_id,
            Some(&preview.basis_head_event_id),
            vec![boundary, summary],
        )?;
        self.accountant.forget(&superseded);

        info!(
            session_id,
            boundary_event_id = %boundary_event_id,
            tokens_before,
            tokens_after,
            regenerated,
            "compaction committed"
        );

        Ok(CompactionResult {
            success: true,
            boundary_event_id,
            summary_event_id,
            summary: summary_text,
            tokens_before,
            tokens_after,
            compression_ratio: compression_ratio(tokens_before, tokens_after),
            regenerated,
            range: preview.affected_event_range,
        })
    }

    /// Phase the session is in, if any.
    pub fn phase(&self, session_id: &str) -> Option<GatePhase> {
        self.gate.phase(session_id)
    }

    /// Drop a remembered preview basis. Returns whether one existed.
    pub fn discard_preview(&self, session_id: &str) -> bool {
        self.previews.remove(session_id).is_some()
    }

    async fn generate(&self, session_id: &str) -> Result<CompactionPreview> {
        let head = self.store.head(session_id)?;
        let window = walk_effective_window(self.store.storage().as_ref(), &head.id)?;
        let tally = self.accountant.tally(&window);
        let tokens_before = tally.totals.total();

        let Some(first) = window.first() else {
            return Err(nothing_to_compact(session_id));
        };
        if tokens_before == 0 {
            return Err(nothing_to_compact(session_id));
        }

        // Retracted messages and their markers never reach the summarizer;
        // the markers end up behind the new boundary.
        let retracted = EventStore::retracted_ids(&window);
        let visible: Vec<SessionEvent> = window
            .iter()
            .filter(|e| e.event_type != EventType::MessageDeleted && !retracted.contains(&e.id))
            .cloned()
            .collect();

        debug!(
            session_id,
            events = visible.len(),
            retracted = retracted.len(),
            tokens_before,
            "summarizing window"
        );
        let timeout_ms = u64::try_from(self.summarizer_timeout.as_millis()).unwrap_or(u64::MAX);
        let summary = tokio::time::timeout(self.summarizer_timeout, self.summarizer.summarize(&visible))
            .await
            .unwrap_or(Err(SummarizerError::Timeout { timeout_ms }))
            .map_err(|e| {
                warn!(session_id, tokens_before, error = %e, "summarization failed");
                ContextError::SummarizationFailed {
                    session_id: session_id.to_string(),
                    tokens_before,
                    message: e.to_string(),
                }
            })?;

        let candidate = CompactSummaryPayload {
            summary: summary.narrative.clone(),
            boundary_event_id: String::new(),
            key_decisions: non_empty(&summary.key_decisions),
            files_modified: non_empty(&summary.files_modified),
        };
        let tokens_after = serde_json::to_value(&candidate)
            .map(|v| self.accountant.estimate(&v))
            .map_err(|e| ContextError::Internal(e.to_string()))?;

        Ok(CompactionPreview {
            session_id: session_id.to_string(),
            basis_head_event_id: head.id.clone(),
            candidate_summary: summary.narrative,
            estimated_tokens_before: tokens_before,
            estimated_tokens_after: tokens_after,
            compression_ratio: compression_ratio(tokens_before, tokens_after),
            affected_event_range: EventRange {
                from_event_id: first.id.clone(),
                to_event_id: head.id,
                event_count: window.len(),
            },
            key_decisions: summary.key_decisions,
            files_modified: summary.files_modified,
        })
    }
}

fn nothing_to_compact(session_id: &str) -> ContextError {
    ContextError::InvalidOperation(format!("nothing to compact in session {session_id}"))
}

fn non_empty(items: &[String]) -> Option<Vec<String>> {
    (!items.is_empty()).then(|| items.to_vec())
}
