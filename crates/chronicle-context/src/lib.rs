//! # chronicle-context
//!
//! Keeps a session's effective context window inside the model's token
//! budget.
//!
//! - [`TokenAccountant`]: per-event cost (memoized) and rolling totals
//! - [`CompactionEngine`]: preview/confirm state machine committing a
//!   boundary+summary pair atomically
//! - [`AdmissionController`]: pre-turn gate on projected usage
//! - [`SessionContextManager`]: public coordinator owning the per-session
//!   [`SessionGate`]
//!
//! Tokenizer, summarizer, and todo lookup are injected collaborators
//! ([`Tokenizer`], [`Summarizer`], [`TodoStore`]) with default
//! implementations for standalone use.

#![deny(unsafe_code)]

pub mod admission;
pub mod compaction;
pub mod constants;
pub mod errors;
pub mod gate;
pub mod manager;
pub mod summarizer;
pub mod todos;
pub mod tokens;
pub mod types;

pub use admission::AdmissionController;
pub use compaction::{CompactionEngine, ConfirmOptions};
pub use errors::{ContextError, Result};
pub use gate::{GatePhase, SessionGate};
pub use manager::{ContextDeps, SessionContextManager};
pub use summarizer::{KeywordSummarizer, Summarizer, SummarizerError, SummaryResult};
pub use todos::{EventTodoStore, TodoStore};
pub use tokens::{CharTokenizer, TokenAccountant, TokenBudget, TokenRole, Tokenizer};
pub use types::*;
