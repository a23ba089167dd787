//! Token estimation and accounting.
//!
//! A [`Tokenizer`] prices a single payload. The [`TokenAccountant`] decides
//! which events count against the budget, memoizes per-event costs, and
//! tallies the effective window.
//!
//! Cost roles:
//!
//! | Event type | Role |
//! |---|---|
//! | `message.user`, `message.system`, `tool.call`, `tool.result`, `compact.summary` | input |
//! | `message.assistant` | output |
//! | everything else | none (cost 0) |

use std::sync::Arc;

use chronicle_events::{EventStore, EventType, SessionEvent};
use chronicle_settings::ContextSettings;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{CHARS_PER_TOKEN, IMAGE_BLOCK_CHARS};
use crate::errors::Result;
use crate::types::{ThresholdLevel, TokenTotals, WindowEntry};

// =============================================================================
// Tokenizer
// =============================================================================

/// Prices an event payload in tokens.
pub trait Tokenizer: Send + Sync {
    /// Estimated token cost of `payload`.
    fn estimate(&self, payload: &Value) -> u64;
}

/// Character-count heuristic: `ceil(chars / 4)`.
///
/// Counts `content` (string or content blocks), `summary`, `name`, and the
/// serialized `arguments` of a payload. Images are charged a flat
/// [`IMAGE_BLOCK_CHARS`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn estimate(&self, payload: &Value) -> u64 {
        chars_to_tokens(payload_chars(payload))
    }
}

/// Convert a character count to tokens, rounding up.
pub fn chars_to_tokens(chars: usize) -> u64 {
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}

fn payload_chars(payload: &Value) -> usize {
    let mut chars = payload.get("content").map_or(0, content_chars);
    for key in ["summary", "name"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            chars += text.len();
        }
    }
    if let Some(args) = payload.get("arguments") {
        chars += args.to_string().len();
    }
    chars
}

fn content_chars(content: &Value) -> usize {
    match content {
        Value::String(s) => s.len(),
        Value::Array(blocks) => blocks.iter().map(block_chars).sum(),
        _ => 0,
    }
}

fn block_chars(block: &Value) -> usize {
    let str_len = |key: &str| block.get(key).and_then(Value::as_str).map_or(0, str::len);
    match block.get("type").and_then(Value::as_str) {
        Some("text") => str_len("text"),
        Some("thinking") => str_len("thinking"),
        Some("tool_use") => {
            let input = block
                .get("input")
                .or_else(|| block.get("arguments"))
                .map_or(0, |v| v.to_string().len());
            str_len("id") + str_len("name") + input
        }
        Some("tool_result") => {
            str_len("tool_use_id") + block.get("content").map_or(0, content_chars)
        }
        Some("image") => IMAGE_BLOCK_CHARS,
        _ => block.to_string().len(),
    }
}

// =============================================================================
// Budget
// =============================================================================

/// Limit and thresholds the accountant measures against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBudget {
    /// Model context limit.
    pub token_limit: u64,
    /// Usage ratio at which compaction is recommended.
    pub warn_threshold: f64,
    /// Usage ratio at which the next turn should trigger compaction.
    pub critical_threshold: f64,
    /// Floor a compaction is assumed to leave behind.
    pub min_post_compaction_tokens: u64,
}

impl TokenBudget {
    /// Usage as a fraction of the limit (0 when the limit is 0).
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_ratio(&self, tokens: u64) -> f64 {
        if self.token_limit == 0 {
            return 0.0;
        }
        tokens as f64 / self.token_limit as f64
    }

    /// Classify a token count against the thresholds.
    pub fn threshold_level(&self, tokens: u64) -> ThresholdLevel {
        let ratio = self.usage_ratio(tokens);
        if ratio >= 1.0 {
            ThresholdLevel::Exceeded
        } else if ratio >= self.critical_threshold {
            ThresholdLevel::Critical
        } else if ratio >= self.warn_threshold {
            ThresholdLevel::Warning
        } else {
            ThresholdLevel::Normal
        }
    }
}

impl From<&ContextSettings> for TokenBudget {
    fn from(settings: &ContextSettings) -> Self {
        Self {
            token_limit: settings.token_limit,
            warn_threshold: settings.warn_threshold,
            critical_threshold: settings.critical_threshold,
            min_post_compaction_tokens: settings.min_post_compaction_tokens,
        }
    }
}

// =============================================================================
// Accountant
// =============================================================================

/// Which side of the budget an event counts against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    /// Sent to the model.
    Input,
    /// Produced by the model.
    Output,
    /// Not counted.
    None,
}

impl TokenRole {
    /// Role of an event type.
    pub fn of(event_type: EventType) -> Self {
        match event_type {
            EventType::MessageUser
            | EventType::MessageSystem
            | EventType::ToolCall
            | EventType::ToolResult
            | EventType::CompactSummary => Self::Input,
            EventType::MessageAssistant => Self::Output,
            _ => Self::None,
        }
    }
}

/// Costs of a window, with the per-event breakdown.
#[derive(Clone, Debug, Default)]
pub struct WindowTally {
    /// Input/output totals.
    pub totals: TokenTotals,
    /// Counted events, oldest first.
    pub entries: Vec<WindowEntry>,
    /// `message.user` + `message.assistant` events still in the window.
    pub message_count: u64,
}

/// Prices events and tallies effective windows.
///
/// Event costs are memoized by id. Events are immutable, so a cached cost
/// never goes stale.
pub struct TokenAccountant {
    tokenizer: Arc<dyn Tokenizer>,
    budget: TokenBudget,
    costs: DashMap<String, u64>,
}

impl TokenAccountant {
    /// Accountant over `tokenizer` measuring against `budget`.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, budget: TokenBudget) -> Self {
        Self {
            tokenizer,
            budget,
            costs: DashMap::new(),
        }
    }

    /// The budget in effect.
    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Price a payload that has not been stored yet.
    pub fn estimate(&self, payload: &Value) -> u64 {
        self.tokenizer.estimate(payload)
    }

    /// Cost of one event. Zero-role events never reach the tokenizer.
    pub fn cost(&self, event: &SessionEvent) -> u64 {
        if TokenRole::of(event.event_type) == TokenRole::None {
            return 0;
        }
        if let Some(cached) = self.costs.get(&event.id) {
            return *cached;
        }
        let cost = self.tokenizer.estimate(&event.payload);
        let _ = self.costs.insert(event.id.clone(), cost);
        cost
    }

    /// Number of memoized event costs.
    pub fn cached_costs(&self) -> usize {
        self.costs.len()
    }

    /// Drop memoized costs for events that left every live window.
    ///
    /// Called when a boundary, clear marker or session end supersedes
    /// them. A later tally of the same events (a fork inheriting them)
    /// simply prices them again.
    pub fn forget(&self, events: &[SessionEvent]) {
        for event in events {
            let _ = self.costs.remove(&event.id);
        }
    }

    /// Tally a window, skipping events retracted inside it.
    pub fn tally(&self, window: &[SessionEvent]) -> WindowTally {
        let retracted = EventStore::retracted_ids(window);
        let mut tally = WindowTally::default();

        for event in window.iter().filter(|e| !retracted.contains(&e.id)) {
            let role = TokenRole::of(event.event_type);
            if role == TokenRole::None {
                continue;
            }
            let cost = self.cost(event);
            match role {
                TokenRole::Input => tally.totals.input += cost,
                TokenRole::Output => tally.totals.output += cost,
                TokenRole::None => {}
            }
            if matches!(
                event.event_type,
                EventType::MessageUser | EventType::MessageAssistant
            ) {
                tally.message_count += 1;
            }
            tally.entries.push(WindowEntry {
                event_id: event.id.clone(),
                event_type: event.event_type,
                role,
                token_cost: cost,
            });
        }
        tally
    }

    /// Rolling totals of a session's current effective window.
    pub fn rolling_total(&self, store: &EventStore, session_id: &str) -> Result<TokenTotals> {
        let window = store.effective_window(session_id)?;
        Ok(self.tally(&window).totals)
    }
}
