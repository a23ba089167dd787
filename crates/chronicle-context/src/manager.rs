//! Session context manager.
//!
//! Public coordinator over the event store and the context components.
//! Every log mutation for a session (append, confirm, clear, fork, end,
//! delete) runs under that session's exclusive lock. Reads go straight to
//! the store and observe whatever is committed.

use std::sync::Arc;

use chronicle_core::SessionId;
use chronicle_events::payloads::ContextClearedPayload;
use chronicle_events::{
    CreateSessionOptions, EventStore, EventStoreError, ForkContext, ListEventsOptions,
    NewSessionEvent, SessionEvent, SessionEventPayload, SessionRecord, open_storage,
};
use chronicle_settings::{ChronicleSettings, CompactionSettings, ContextSettings};
use tracing::{debug, info, instrument, warn};

use crate::admission::AdmissionController;
use crate::compaction::{CompactionEngine, ConfirmOptions};
use crate::constants::DEFAULT_CLEAR_REASON;
use crate::errors::{ContextError, Result};
use crate::gate::{GatePhase, SessionGate};
use crate::summarizer::{KeywordSummarizer, Summarizer};
use crate::todos::{EventTodoStore, TodoStore};
use crate::tokens::{CharTokenizer, TokenAccountant, TokenBudget, Tokenizer, WindowTally};
use crate::types::{
    ClearContextResult, CompactionPreview, CompactionResult, ContextSnapshot,
    DetailedContextSnapshot, PreTurnValidation, Thresholds,
};

/// Collaborators the manager is built from.
pub struct ContextDeps {
    /// Event log.
    pub store: EventStore,
    /// Payload pricing.
    pub tokenizer: Arc<dyn Tokenizer>,
    /// Compaction summaries.
    pub summarizer: Arc<dyn Summarizer>,
    /// Todo lookup for clears.
    pub todos: Arc<dyn TodoStore>,
}

impl ContextDeps {
    /// `store` with the built-in tokenizer, summarizer, and todo store.
    pub fn with_defaults(store: EventStore) -> Self {
        Self {
            store,
            tokenizer: Arc::new(CharTokenizer),
            summarizer: Arc::new(KeywordSummarizer),
            todos: Arc::new(EventTodoStore),
        }
    }
}

/// Coordinates accounting, admission, compaction, and clears per session.
pub struct SessionContextManager {
    store: EventStore,
    accountant: Arc<TokenAccountant>,
    engine: CompactionEngine,
    admission: AdmissionController,
    todos: Arc<dyn TodoStore>,
    gate: Arc<SessionGate>,
}

impl SessionContextManager {
    /// Build from explicit collaborators and settings.
    pub fn new(deps: ContextDeps, context: &ContextSettings, compaction: &CompactionSettings) -> Self {
        let gate = Arc::new(SessionGate::new());
        let accountant = Arc::new(TokenAccountant::new(
            deps.tokenizer,
            TokenBudget::from(context),
        ));
        let engine = CompactionEngine::new(
            deps.store.clone(),
            accountant.clone(),
            deps.summarizer,
            gate.clone(),
            compaction,
        );
        let admission = AdmissionController::new(deps.store.clone(), accountant.clone());
        Self {
            store: deps.store,
            accountant,
            engine,
            admission,
            todos: deps.todos,
            gate,
        }
    }

    /// Open the configured store and wire the default collaborators.
    pub fn from_settings(settings: &ChronicleSettings) -> Result<Self> {
        let storage = open_storage(&settings.store)?;
        info!(backend = ?settings.store.backend, "event store opened");
        Ok(Self::new(
            ContextDeps::with_defaults(EventStore::new(storage)),
            &settings.context,
            &settings.compaction,
        ))
    }

    /// The underlying event store.
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The budget in effect.
    pub fn budget(&self) -> &TokenBudget {
        self.accountant.budget()
    }

    /// Token accounting shared by every session.
    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    /// Number of sessions holding a mutation lock entry.
    pub fn tracked_sessions(&self) -> usize {
        self.gate.tracked_sessions()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions and events
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session.
    #[instrument(skip_all)]
    pub fn create_session(&self, opts: &CreateSessionOptions) -> Result<SessionRecord> {
        let (record, _root) = self.store.create_session(opts)?;
        Ok(record)
    }

    /// Append one event under the session lock.
    ///
    /// A `SequenceConflict` is retried once with the refreshed head unless
    /// the caller pinned `parent_id`.
    #[instrument(skip_all, fields(session_id = %event.session_id, event_type = %event.event_type()))]
    pub async fn append_event(&self, event: &NewSessionEvent) -> Result<SessionEvent> {
        let _lock = self.gate.lock(&event.session_id).await;
        match self.store.append(event) {
            Err(EventStoreError::SequenceConflict { expected, actual, .. })
                if event.parent_id.is_none() =>
            {
                warn!(%expected, %actual, "sequence conflict, retrying once");
                Ok(self.store.append(event)?)
            }
            other => Ok(other?),
        }
    }

    /// Branch a new session off `parent_event_id`.
    #[instrument(skip(self))]
    pub async fn fork_session(
        &self,
        parent_event_id: &str,
        new_session_id: Option<&str>,
    ) -> Result<ForkContext> {
        let parent = self
            .store
            .get_event(parent_event_id)?
            .ok_or_else(|| ContextError::InvalidParent(parent_event_id.to_string()))?;
        let new_session_id = new_session_id
            .map_or_else(|| SessionId::new().into_inner(), ToOwned::to_owned);

        let _lock = self.gate.lock(&parent.session_id).await;
        Ok(self.store.fork(parent_event_id, &new_session_id)?)
    }

    /// Close a session and drop its in-memory state.
    ///
    /// The cached preview, memoized window costs and the session's lock
    /// entry are released; the log itself is untouched.
    #[instrument(skip(self))]
    pub async fn end_session(&self, session_id: &str, reason: Option<String>) -> Result<SessionEvent> {
        let lock = self.gate.lock(session_id).await;
        let window = self.store.effective_window(session_id)?;
        let ended = self.store.end_session(session_id, reason)?;
        let _ = self.engine.discard_preview(session_id);
        self.accountant.forget(&window);
        drop(lock);
        let _ = self.gate.release(session_id);
        debug!(evicted = window.len(), "session state released");
        Ok(ended)
    }

    /// Retract a message.
    #[instrument(skip(self))]
    pub async fn delete_message(
        &self,
        session_id: &str,
        target_event_id: &str,
        reason: Option<String>,
    ) -> Result<SessionEvent> {
        let _lock = self.gate.lock(session_id).await;
        Ok(self.store.delete_message(session_id, target_event_id, reason)?)
    }

    /// The session's own events, oldest first.
    pub fn history(&self, session_id: &str, opts: &ListEventsOptions) -> Result<Vec<SessionEvent>> {
        Ok(self.store.history(session_id, opts)?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Context reads
    // ─────────────────────────────────────────────────────────────────────

    /// Token usage of the current effective window.
    #[instrument(skip(self))]
    pub fn get_snapshot(&self, session_id: &str) -> Result<ContextSnapshot> {
        let window = self.store.effective_window(session_id)?;
        let tally = self.accountant.tally(&window);
        Ok(self.snapshot_from(session_id, &tally))
    }

    /// Snapshot plus the per-event costs of the window.
    #[instrument(skip(self))]
    pub fn get_detailed_snapshot(&self, session_id: &str) -> Result<DetailedContextSnapshot> {
        let head = self.store.head(session_id)?;
        let window =
            chronicle_events::walk_effective_window(self.store.storage().as_ref(), &head.id)?;
        let tally = self.accountant.tally(&window);
        Ok(DetailedContextSnapshot {
            snapshot: self.snapshot_from(session_id, &tally),
            entries: tally.entries,
            head_event_id: head.id,
        })
    }

    /// Whether usage has reached the warn threshold.
    #[instrument(skip(self))]
    pub fn should_compact(&self, session_id: &str) -> Result<bool> {
        self.engine.should_compact(session_id)
    }

    /// Pre-turn verdict.
    #[instrument(skip(self))]
    pub fn can_accept_turn(
        &self,
        session_id: &str,
        estimated_response_tokens: u64,
    ) -> Result<PreTurnValidation> {
        self.admission
            .can_accept_turn(session_id, estimated_response_tokens)
    }

    /// Pre-turn verdict that fails with `ContextOverflow`.
    #[instrument(skip(self))]
    pub fn admit_turn(
        &self,
        session_id: &str,
        estimated_response_tokens: u64,
    ) -> Result<PreTurnValidation> {
        self.admission.admit_turn(session_id, estimated_response_tokens)
    }

    /// Phase the session is in, if any.
    pub fn compaction_phase(&self, session_id: &str) -> Option<GatePhase> {
        self.engine.phase(session_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Context mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Candidate compaction; never writes.
    #[instrument(skip(self))]
    pub async fn preview_compaction(&self, session_id: &str) -> Result<CompactionPreview> {
        self.engine.preview(session_id).await
    }

    /// Commit a compaction.
    #[instrument(skip(self, opts), fields(edited = opts.edited_summary.is_some()))]
    pub async fn confirm_compaction(
        &self,
        session_id: &str,
        opts: &ConfirmOptions,
    ) -> Result<CompactionResult> {
        self.engine.confirm(session_id, opts).await
    }

    /// Start a fresh window with a `context.cleared` marker.
    ///
    /// Returns the open todos that belonged to the cleared window.
    #[instrument(skip(self))]
    pub async fn clear_context(
        &self,
        session_id: &str,
        reason: Option<String>,
    ) -> Result<ClearContextResult> {
        let _phase = self.gate.enter(session_id, GatePhase::Clearing)?;
        let _lock = self.gate.lock(session_id).await;

        let window = self.store.effective_window(session_id)?;
        let tokens_before = self.accountant.tally(&window).totals.total();
        let cleared_todos = self
            .todos
            .todos_for_window(session_id, &window)
            .map_err(|e| ContextError::Internal(format!("todo lookup failed: {e}")))?;

        let marker = self.store.append(&NewSessionEvent::new(
            session_id,
            SessionEventPayload::ContextCleared(ContextClearedPayload {
                tokens_before,
                tokens_after: 0,
                reason: reason.unwrap_or_else(|| DEFAULT_CLEAR_REASON.to_string()),
            }),
        ))?;
        let _ = self.engine.discard_preview(session_id);
        self.accountant.forget(&window);

        info!(
            session_id,
            tokens_before,
            cleared_todos = cleared_todos.len(),
            "context cleared"
        );
        Ok(ClearContextResult {
            success: true,
            marker_event_id: marker.id,
            tokens_before,
            tokens_after: 0,
            cleared_todos,
        })
    }

    fn snapshot_from(&self, session_id: &str, tally: &WindowTally) -> ContextSnapshot {
        let budget = self.accountant.budget();
        let total = tally.totals.total();
        ContextSnapshot {
            session_id: session_id.to_string(),
            tokens_used: tally.totals,
            token_limit: budget.token_limit,
            usage_percent: budget.usage_ratio(total) * 100.0,
            threshold_level: budget.threshold_level(total),
            thresholds: Thresholds {
                warn: budget.warn_threshold,
                critical: budget.critical_threshold,
            },
            message_count: tally.message_count,
        }
    }
}
