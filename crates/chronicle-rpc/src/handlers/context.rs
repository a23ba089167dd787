//! Context handlers: getSnapshot, getDetailedSnapshot, shouldCompact,
//! preview, confirm, canAcceptTurn, clear.

use async_trait::async_trait;
use chronicle_context::ConfirmOptions;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handler::MethodHandler;
use crate::handlers::{opt_string_param, require_string_param, require_u64_param, to_json};

/// Token usage of a session's effective window.
pub struct GetSnapshotHandler;

#[async_trait]
impl MethodHandler for GetSnapshotHandler {
    #[instrument(skip(self, ctx), fields(method = "context.getSnapshot"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        to_json(&ctx.manager.get_snapshot(&session_id)?)
    }
}

/// Snapshot with per-event costs.
pub struct GetDetailedSnapshotHandler;

#[async_trait]
impl MethodHandler for GetDetailedSnapshotHandler {
    #[instrument(skip(self, ctx), fields(method = "context.getDetailedSnapshot"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        to_json(&ctx.manager.get_detailed_snapshot(&session_id)?)
    }
}

/// Whether usage has reached the warn threshold.
pub struct ShouldCompactHandler;

#[async_trait]
impl MethodHandler for ShouldCompactHandler {
    #[instrument(skip(self, ctx), fields(method = "context.shouldCompact"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let should_compact = ctx.manager.should_compact(&session_id)?;
        Ok(json!({ "sessionId": session_id, "shouldCompact": should_compact }))
    }
}

/// Candidate compaction; writes nothing.
pub struct PreviewCompactionHandler;

#[async_trait]
impl MethodHandler for PreviewCompactionHandler {
    #[instrument(skip(self, ctx), fields(method = "context.preview"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        to_json(&ctx.manager.preview_compaction(&session_id).await?)
    }
}

/// Commit a compaction.
///
/// Params: `sessionId`, optional `editedSummary`, optional `reason`.
pub struct ConfirmCompactionHandler;

#[async_trait]
impl MethodHandler for ConfirmCompactionHandler {
    #[instrument(skip(self, ctx), fields(method = "context.confirm"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let opts = ConfirmOptions {
            edited_summary: opt_string_param(params.as_ref(), "editedSummary")?,
            reason: opt_string_param(params.as_ref(), "reason")?,
        };
        to_json(&ctx.manager.confirm_compaction(&session_id, &opts).await?)
    }
}

/// Pre-turn admission check.
///
/// Params: `sessionId`, `estimatedResponseTokens`.
pub struct CanAcceptTurnHandler;

#[async_trait]
impl MethodHandler for CanAcceptTurnHandler {
    #[instrument(skip(self, ctx), fields(method = "context.canAcceptTurn"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let estimated = require_u64_param(params.as_ref(), "estimatedResponseTokens")?;
        to_json(&ctx.manager.can_accept_turn(&session_id, estimated)?)
    }
}

/// Clear the context window.
pub struct ClearHandler;

#[async_trait]
impl MethodHandler for ClearHandler {
    #[instrument(skip(self, ctx), fields(method = "context.clear"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let reason = opt_string_param(params.as_ref(), "reason")?;
        to_json(&ctx.manager.clear_context(&session_id, reason).await?)
    }
}
