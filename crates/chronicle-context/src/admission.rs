//! Pre-turn admission control.

use std::sync::Arc;

use chronicle_events::EventStore;
use tracing::warn;

use crate::errors::{ContextError, Result};
use crate::tokens::{TokenAccountant, TokenBudget};
use crate::types::PreTurnValidation;

/// Decides whether a session can take another turn.
pub struct AdmissionController {
    store: EventStore,
    accountant: Arc<TokenAccountant>,
}

impl AdmissionController {
    /// Controller reading totals through `accountant`.
    pub fn new(store: EventStore, accountant: Arc<TokenAccountant>) -> Self {
        Self { store, accountant }
    }

    /// Verdict for a turn expected to add `estimated_response_tokens`.
    pub fn can_accept_turn(
        &self,
        session_id: &str,
        estimated_response_tokens: u64,
    ) -> Result<PreTurnValidation> {
        let totals = self.accountant.rolling_total(&self.store, session_id)?;
        Ok(evaluate(
            self.accountant.budget(),
            totals.total(),
            estimated_response_tokens,
        ))
    }

    /// Like [`can_accept_turn`](Self::can_accept_turn), but a turn that
    /// cannot fit even after maximal compaction is a `ContextOverflow`.
    pub fn admit_turn(
        &self,
        session_id: &str,
        estimated_response_tokens: u64,
    ) -> Result<PreTurnValidation> {
        let verdict = self.can_accept_turn(session_id, estimated_response_tokens)?;
        if !verdict.can_proceed {
            warn!(
                session_id,
                projected_tokens = verdict.projected_tokens,
                token_limit = verdict.token_limit,
                "turn rejected: context overflow"
            );
            return Err(ContextError::ContextOverflow {
                session_id: session_id.to_string(),
                projected_tokens: verdict.projected_tokens,
                token_limit: verdict.token_limit,
            });
        }
        Ok(verdict)
    }
}

/// Pure admission rule.
///
/// - `projected = current + estimated`
/// - `recommend_compaction = projected ≥ critical · limit`
/// - `can_proceed = min(projected, min_post_compaction + estimated) < limit`
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(budget: &TokenBudget, current_tokens: u64, estimated_response_tokens: u64) -> PreTurnValidation {
    let projected = current_tokens.saturating_add(estimated_response_tokens);
    let critical_tokens = budget.critical_threshold * budget.token_limit as f64;
    let best_case = projected.min(
        budget
            .min_post_compaction_tokens
            .saturating_add(estimated_response_tokens),
    );

    PreTurnValidation {
        can_proceed: best_case < budget.token_limit,
        recommend_compaction: projected as f64 >= critical_tokens,
        current_tokens,
        projected_tokens: projected,
        token_limit: budget.token_limit,
        min_post_compaction_tokens: budget.min_post_compaction_tokens,
    }
}
