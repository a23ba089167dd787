//! End-to-end behaviour of the context manager over a real event store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chronicle_context::{
    ConfirmOptions, ContextDeps, ContextError, KeywordSummarizer, SessionContextManager,
    Summarizer, SummarizerError, SummaryResult, ThresholdLevel,
};
use chronicle_events::payloads::{
    AssistantMessagePayload, CompactBoundaryPayload, TodoItem, TodoWritePayload,
    UserMessagePayload,
};
use chronicle_events::{
    CreateSessionOptions, EventStorage, EventStore, EventStoreError, EventType, ListEventsOptions,
    MemoryStorage, NewSessionEvent, SessionEvent, SessionEventPayload, SessionRecord,
    SqliteStorage,
};
use chronicle_settings::{CompactionSettings, ContextSettings};

// ── Collaborators ───────────────────────────────────────────────────────

struct FixedSummarizer {
    text: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedSummarizer {
    fn new(text: &str) -> Self {
        Self::slow(text, Duration::ZERO)
    }

    fn slow(text: &str, delay: Duration) -> Self {
        Self {
            text: text.into(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _window: &[SessionEvent]) -> Result<SummaryResult, SummarizerError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(SummaryResult {
            narrative: self.text.clone(),
            key_decisions: vec!["use sqlite".into()],
            files_modified: vec![],
        })
    }
}

struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _window: &[SessionEvent]) -> Result<SummaryResult, SummarizerError> {
        Err(SummarizerError::CallFailed {
            message: "model unavailable".into(),
        })
    }
}

/// Delegates to memory storage but refuses any batch carrying a summary.
struct RejectingSummaryStorage(MemoryStorage);

impl EventStorage for RejectingSummaryStorage {
    fn create_session(
        &self,
        record: &SessionRecord,
        root: &SessionEvent,
    ) -> chronicle_events::Result<()> {
        self.0.create_session(record, root)
    }

    fn get_session(&self, session_id: &str) -> chronicle_events::Result<Option<SessionRecord>> {
        self.0.get_session(session_id)
    }

    fn get_event(&self, event_id: &str) -> chronicle_events::Result<Option<SessionEvent>> {
        self.0.get_event(event_id)
    }

    fn append_batch(
        &self,
        session_id: &str,
        expected_head_id: &str,
        events: &[SessionEvent],
    ) -> chronicle_events::Result<SessionRecord> {
        if events
            .iter()
            .any(|e| e.event_type == EventType::CompactSummary)
        {
            return Err(EventStoreError::Internal("disk full".into()));
        }
        self.0.append_batch(session_id, expected_head_id, events)
    }

    fn list_session_events(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> chronicle_events::Result<Vec<SessionEvent>> {
        self.0.list_session_events(session_id, limit, offset)
    }

    fn children(&self, event_id: &str) -> chronicle_events::Result<Vec<SessionEvent>> {
        self.0.children(event_id)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn context_settings(min_post: u64) -> ContextSettings {
    ContextSettings {
        token_limit: 1000,
        warn_threshold: 0.8,
        critical_threshold: 0.95,
        min_post_compaction_tokens: min_post,
    }
}

fn build(store: EventStore, summarizer: Arc<dyn Summarizer>) -> SessionContextManager {
    let deps = ContextDeps {
        summarizer,
        ..ContextDeps::with_defaults(store)
    };
    SessionContextManager::new(deps, &context_settings(100), &CompactionSettings::default())
}

fn manager(summarizer: Arc<dyn Summarizer>) -> SessionContextManager {
    build(EventStore::in_memory(), summarizer)
}

fn user(session_id: &str, chars: usize) -> NewSessionEvent {
    NewSessionEvent::new(
        session_id,
        SessionEventPayload::MessageUser(UserMessagePayload::text("x".repeat(chars))),
    )
}

fn assistant(session_id: &str, chars: usize) -> NewSessionEvent {
    NewSessionEvent::new(
        session_id,
        SessionEventPayload::MessageAssistant(AssistantMessagePayload::text("y".repeat(chars))),
    )
}

async fn session_with(m: &SessionContextManager, chars: usize) -> String {
    let record = m.create_session(&CreateSessionOptions::default()).unwrap();
    let _ = m.append_event(&user(&record.id, chars)).await.unwrap();
    record.id
}

fn edited(text: &str) -> ConfirmOptions {
    ConfirmOptions {
        edited_summary: Some(text.into()),
        reason: None,
    }
}

// ── Thresholds and admission ────────────────────────────────────────────

#[tokio::test]
async fn warn_threshold_triggers_compaction_recommendation() {
    let m = manager(Arc::new(FixedSummarizer::new("s")));
    let sid = session_with(&m, 3400).await;

    let snapshot = m.get_snapshot(&sid).unwrap();
    assert_eq!(snapshot.tokens_used.input, 850);
    assert_eq!(snapshot.threshold_level, ThresholdLevel::Warning);
    assert!(m.should_compact(&sid).unwrap());

    let verdict = m.can_accept_turn(&sid, 200).unwrap();
    assert!(verdict.recommend_compaction);
    assert_eq!(verdict.projected_tokens, 1050);
    assert!(verdict.can_proceed);
}

#[tokio::test]
async fn below_warn_threshold_does_not_recommend() {
    let m = manager(Arc::new(FixedSummarizer::new("s")));
    let sid = session_with(&m, 400).await;
    assert!(!m.should_compact(&sid).unwrap());
    assert!(!m.can_accept_turn(&sid, 200).unwrap().recommend_compaction);
}

#[tokio::test]
async fn overflow_when_turn_cannot_fit_after_compaction() {
    let deps = ContextDeps::with_defaults(EventStore::in_memory());
    let m = SessionContextManager::new(deps, &context_settings(900), &CompactionSettings::default());
    let sid = session_with(&m, 3800).await;

    let verdict = m.can_accept_turn(&sid, 200).unwrap();
    assert!(!verdict.can_proceed);

    let err = m.admit_turn(&sid, 200).unwrap_err();
    assert_matches!(
        err,
        ContextError::ContextOverflow { session_id, projected_tokens: 1150, token_limit: 1000 }
            if session_id == sid
    );
}

// ── Compaction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn confirm_regenerates_against_advanced_head() {
    let summarizer = Arc::new(FixedSummarizer::new("condensed history"));
    let m = manager(summarizer.clone());
    let sid = session_with(&m, 3400).await;

    let preview = m.preview_compaction(&sid).await.unwrap();
    let newer = m.append_event(&user(&sid, 4)).await.unwrap();
    assert_ne!(preview.basis_head_event_id, newer.id);

    let result = m.confirm_compaction(&sid, &edited("short")).await.unwrap();
    assert!(result.regenerated);
    assert_eq!(result.summary, "short");
    assert_eq!(result.tokens_before, 851);
    assert_eq!(summarizer.calls(), 2);

    let boundary = m.store().get_event(&result.boundary_event_id).unwrap().unwrap();
    assert_eq!(boundary.parent_id.as_deref(), Some(newer.id.as_str()));
    let payload: CompactBoundaryPayload = serde_json::from_value(boundary.payload).unwrap();
    assert_eq!(payload.range.to, newer.id);

    let summary = m.store().get_event(&result.summary_event_id).unwrap().unwrap();
    assert_eq!(summary.payload_str("summary"), Some("short"));
    assert_eq!(summary.payload_str("boundaryEventId"), Some(boundary.id.as_str()));
    assert_eq!(summary.parent_id.as_deref(), Some(boundary.id.as_str()));
}

#[tokio::test]
async fn fresh_preview_is_committed_without_regenerating() {
    let summarizer = Arc::new(FixedSummarizer::new("condensed history"));
    let m = manager(summarizer.clone());
    let sid = session_with(&m, 3400).await;

    let preview = m.preview_compaction(&sid).await.unwrap();
    let result = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap();
    assert!(!result.regenerated);
    assert_eq!(result.summary, preview.candidate_summary);
    assert_eq!(result.tokens_after, preview.estimated_tokens_after);
    assert_eq!(summarizer.calls(), 1);
}

#[tokio::test]
async fn concurrent_confirms_admit_exactly_one() {
    let m = manager(Arc::new(FixedSummarizer::slow(
        "condensed",
        Duration::from_millis(50),
    )));
    let sid = session_with(&m, 3400).await;
    let opts = ConfirmOptions::default();

    let (a, b) = tokio::join!(
        m.confirm_compaction(&sid, &opts),
        m.confirm_compaction(&sid, &opts)
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(ContextError::InvalidOperation(_))))
            .count(),
        1
    );

    let boundaries = m
        .history(&sid, &ListEventsOptions::default())
        .unwrap()
        .iter()
        .filter(|e| e.event_type == EventType::CompactBoundary)
        .count();
    assert_eq!(boundaries, 1);
}

#[tokio::test]
async fn preview_rejected_while_confirm_in_flight() {
    let m = manager(Arc::new(FixedSummarizer::slow(
        "condensed",
        Duration::from_millis(50),
    )));
    let sid = session_with(&m, 3400).await;

    let opts = ConfirmOptions::default();
    let (confirmed, previewed) = tokio::join!(
        m.confirm_compaction(&sid, &opts),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            m.preview_compaction(&sid).await
        }
    );
    assert!(confirmed.is_ok());
    assert_matches!(previewed, Err(ContextError::InvalidOperation(_)));
}

#[tokio::test]
async fn appends_proceed_during_preview() {
    let m = manager(Arc::new(FixedSummarizer::slow(
        "condensed",
        Duration::from_millis(50),
    )));
    let sid = session_with(&m, 3400).await;
    let basis = m.store().head(&sid).unwrap();

    let (preview, appended) = tokio::join!(m.preview_compaction(&sid), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        m.append_event(&assistant(&sid, 40)).await
    });
    let preview = preview.unwrap();
    let appended = appended.unwrap();
    assert_eq!(preview.basis_head_event_id, basis.id);
    assert_eq!(m.store().head(&sid).unwrap().id, appended.id);
}

#[tokio::test]
async fn repeated_previews_never_mutate_the_log() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 3400).await;
    let before = m.history(&sid, &ListEventsOptions::default()).unwrap();

    for _ in 0..3 {
        let _ = m.preview_compaction(&sid).await.unwrap();
    }

    let after = m.history(&sid, &ListEventsOptions::default()).unwrap();
    assert_eq!(before, after);
    assert_eq!(m.compaction_phase(&sid), None);
}

#[tokio::test]
async fn compaction_shrinks_the_window() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 2000).await;
    let reply = m.append_event(&assistant(&sid, 1200)).await.unwrap();
    let before = m.get_snapshot(&sid).unwrap();

    let result = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap();
    let after = m.get_snapshot(&sid).unwrap();

    assert!(after.tokens_used.total() <= before.tokens_used.total());
    assert_eq!(after.tokens_used.total(), result.tokens_after);
    assert_eq!(after.message_count, 0);

    let window = m.store().effective_window(&sid).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, result.summary_event_id);
    assert!(window.iter().all(|e| e.id != reply.id));
}

#[tokio::test]
async fn second_compaction_folds_in_the_first_summary() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 2000).await;
    let first = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap();

    let _ = m.append_event(&user(&sid, 400)).await.unwrap();
    let preview = m.preview_compaction(&sid).await.unwrap();
    assert_eq!(preview.affected_event_range.from_event_id, first.summary_event_id);
    assert_eq!(preview.affected_event_range.event_count, 2);

    let second = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap();
    let window = m.store().effective_window(&sid).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, second.summary_event_id);
}

#[tokio::test]
async fn summary_that_does_not_shrink_is_rejected() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 40).await;
    let head = m.store().head(&sid).unwrap();

    let err = m
        .confirm_compaction(&sid, &edited(&"z".repeat(400)))
        .await
        .unwrap_err();
    assert_matches!(err, ContextError::InvalidOperation(msg) if msg.contains("would not reduce"));
    assert_eq!(m.store().head(&sid).unwrap().id, head.id);
}

#[tokio::test]
async fn empty_window_has_nothing_to_compact() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let record = m.create_session(&CreateSessionOptions::default()).unwrap();

    assert_matches!(
        m.preview_compaction(&record.id).await,
        Err(ContextError::InvalidOperation(msg)) if msg.contains("nothing to compact")
    );
}

#[tokio::test]
async fn summarizer_failure_persists_nothing() {
    let m = manager(Arc::new(FailingSummarizer));
    let sid = session_with(&m, 3400).await;
    let before = m.history(&sid, &ListEventsOptions::default()).unwrap();

    let err = m.preview_compaction(&sid).await.unwrap_err();
    assert_matches!(
        err,
        ContextError::SummarizationFailed { session_id, tokens_before: 850, message }
            if session_id == sid && message.contains("model unavailable")
    );
    let err = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, ContextError::SummarizationFailed { .. });

    assert_eq!(m.history(&sid, &ListEventsOptions::default()).unwrap(), before);
    assert_eq!(m.compaction_phase(&sid), None);
}

#[tokio::test(start_paused = true)]
async fn slow_summarizer_times_out() {
    let summarizer = Arc::new(FixedSummarizer::slow("late", Duration::from_secs(60)));
    let deps = ContextDeps {
        summarizer,
        ..ContextDeps::with_defaults(EventStore::in_memory())
    };
    let m = SessionContextManager::new(
        deps,
        &context_settings(100),
        &CompactionSettings {
            summarizer_timeout_ms: 1000,
        },
    );
    let sid = session_with(&m, 3400).await;

    let err = m.preview_compaction(&sid).await.unwrap_err();
    assert_matches!(
        err,
        ContextError::SummarizationFailed { message, .. } if message.contains("timed out after 1000ms")
    );
}

#[tokio::test]
async fn storage_failure_leaves_no_boundary() {
    let store = EventStore::new(Arc::new(RejectingSummaryStorage(MemoryStorage::new())));
    let m = build(store, Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 3400).await;
    let before = m.get_snapshot(&sid).unwrap();

    let err = m
        .confirm_compaction(&sid, &ConfirmOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, ContextError::Internal(msg) if msg.contains("disk full"));

    let history = m.history(&sid, &ListEventsOptions::default()).unwrap();
    assert!(history.iter().all(|e| !e.event_type.is_window_marker()));
    assert_eq!(m.get_snapshot(&sid).unwrap(), before);
    assert_eq!(m.compaction_phase(&sid), None);
}

// ── Clear ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn clear_then_snapshot_is_empty() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 400).await;
    let _ = m.append_event(&assistant(&sid, 400)).await.unwrap();
    let todo = TodoItem {
        id: "t1".into(),
        content: "ship it".into(),
        active_form: "Shipping it".into(),
        status: "in_progress".into(),
        source: "agent".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
        completed_at: None,
    };
    let _ = m
        .append_event(&NewSessionEvent::new(
            &sid,
            SessionEventPayload::TodoWrite(TodoWritePayload {
                todos: vec![todo.clone()],
                trigger: "tool".into(),
            }),
        ))
        .await
        .unwrap();

    let cleared = m.clear_context(&sid, Some("fresh start".into())).await.unwrap();
    assert_eq!(cleared.tokens_before, 200);
    assert_eq!(cleared.tokens_after, 0);
    assert_eq!(cleared.cleared_todos, vec![todo]);

    let snapshot = m.get_snapshot(&sid).unwrap();
    assert_eq!(snapshot.tokens_used.total(), 0);
    assert_eq!(snapshot.message_count, 0);

    let _ = m.append_event(&user(&sid, 8)).await.unwrap();
    assert_eq!(m.get_snapshot(&sid).unwrap().tokens_used.total(), 2);
}

#[tokio::test]
async fn deleted_messages_stop_counting() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let record = m.create_session(&CreateSessionOptions::default()).unwrap();
    let big = m.append_event(&user(&record.id, 400)).await.unwrap();
    let _ = m.append_event(&user(&record.id, 40)).await.unwrap();

    let _ = m
        .delete_message(&record.id, &big.id, Some("pasted secrets".into()))
        .await
        .unwrap();
    let snapshot = m.get_snapshot(&record.id).unwrap();
    assert_eq!(snapshot.tokens_used.input, 10);
    assert_eq!(snapshot.message_count, 1);
}

#[tokio::test]
async fn compaction_summary_omits_deleted_messages() {
    let m = manager(Arc::new(KeywordSummarizer));
    let record = m.create_session(&CreateSessionOptions::default()).unwrap();
    let secret = m
        .append_event(&NewSessionEvent::new(
            &record.id,
            SessionEventPayload::MessageUser(UserMessagePayload::text(format!(
                "my password is hunter2 {}",
                "z".repeat(2000)
            ))),
        ))
        .await
        .unwrap();
    let _ = m
        .delete_message(&record.id, &secret.id, Some("leaked credential".into()))
        .await
        .unwrap();
    let _ = m.append_event(&user(&record.id, 2000)).await.unwrap();
    assert_eq!(m.get_snapshot(&record.id).unwrap().tokens_used.input, 500);

    let result = m
        .confirm_compaction(&record.id, &ConfirmOptions::default())
        .await
        .unwrap();
    assert_eq!(result.tokens_before, 500);
    assert!(!result.summary.contains("hunter2"));
    assert!(result.summary.contains("The user made 1 requests."));

    let window = m.store().effective_window(&record.id).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].event_type, EventType::CompactSummary);
}

#[tokio::test]
async fn ending_sessions_releases_per_session_state() {
    let m = manager(Arc::new(FixedSummarizer::new("s")));
    for _ in 0..50 {
        let record = m.create_session(&CreateSessionOptions::default()).unwrap();
        for _ in 0..20 {
            let _ = m.append_event(&user(&record.id, 40)).await.unwrap();
        }
        let _ = m.get_snapshot(&record.id).unwrap();
        let _ = m.end_session(&record.id, None).await.unwrap();
    }
    assert_eq!(m.accountant().cached_costs(), 0);
    assert_eq!(m.tracked_sessions(), 0);
}

#[tokio::test]
async fn committed_compaction_evicts_superseded_costs() {
    let m = manager(Arc::new(FixedSummarizer::new("short")));
    let sid = session_with(&m, 3400).await;
    let _ = m.append_event(&assistant(&sid, 40)).await.unwrap();
    let _ = m.get_snapshot(&sid).unwrap();
    assert_eq!(m.accountant().cached_costs(), 2);

    let _ = m.confirm_compaction(&sid, &ConfirmOptions::default()).await.unwrap();
    let _ = m.get_snapshot(&sid).unwrap();
    // only the new summary is priced
    assert_eq!(m.accountant().cached_costs(), 1);
}

// ── Forks ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn fork_inherits_window_up_to_fork_point() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let record = m.create_session(&CreateSessionOptions::default()).unwrap();
    let msg = m.append_event(&user(&record.id, 400)).await.unwrap();
    let _ = m.append_event(&user(&record.id, 40)).await.unwrap();

    let fork = m.fork_session(&msg.id, Some("sess_branch")).await.unwrap();
    assert_eq!(fork.parent_event_ids, vec![record.root_event_id.clone(), msg.id.clone()]);
    assert_eq!(m.get_snapshot("sess_branch").unwrap().tokens_used.input, 100);

    let _ = m.append_event(&user("sess_branch", 8)).await.unwrap();
    assert_eq!(m.get_snapshot("sess_branch").unwrap().tokens_used.input, 102);
    assert_eq!(m.get_snapshot(&record.id).unwrap().tokens_used.input, 110);
}

#[tokio::test]
async fn compacting_a_fork_leaves_the_parent_untouched() {
    let m = manager(Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 3400).await;
    let head = m.store().head(&sid).unwrap();
    let fork = m.fork_session(&head.id, None).await.unwrap();

    let result = m
        .confirm_compaction(&fork.new_session_id, &ConfirmOptions::default())
        .await
        .unwrap();
    assert_eq!(result.tokens_before, 850);
    assert_eq!(result.range.from_event_id, m.store().require_session(&sid).unwrap().root_event_id);
    assert_eq!(m.get_snapshot(&sid).unwrap().tokens_used.input, 850);
    assert_eq!(
        m.get_snapshot(&fork.new_session_id).unwrap().tokens_used.total(),
        result.tokens_after
    );
}

// ── SQLite backend ──────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_backend_commits_compaction_atomically() {
    let store = EventStore::new(Arc::new(SqliteStorage::in_memory().unwrap()));
    let m = build(store, Arc::new(FixedSummarizer::new("condensed")));
    let sid = session_with(&m, 3400).await;

    let result = m
        .confirm_compaction(&sid, &edited("short"))
        .await
        .unwrap();
    let window = m.store().effective_window(&sid).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, result.summary_event_id);

    let sequences: Vec<_> = m
        .history(&sid, &ListEventsOptions::default())
        .unwrap()
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}
