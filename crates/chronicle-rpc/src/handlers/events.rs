//! Event handlers: getHistory.

use async_trait::async_trait;
use chronicle_events::ListEventsOptions;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handler::MethodHandler;
use crate::handlers::{opt_usize_param, require_string_param};

/// A session's own events, oldest first.
///
/// Params: `sessionId`, optional `limit`, optional `offset`.
pub struct GetHistoryHandler;

#[async_trait]
impl MethodHandler for GetHistoryHandler {
    #[instrument(skip(self, ctx), fields(method = "events.getHistory"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let opts = ListEventsOptions {
            limit: opt_usize_param(params.as_ref(), "limit")?,
            offset: opt_usize_param(params.as_ref(), "offset")?,
        };
        let events = ctx.manager.history(&session_id, &opts)?;
        Ok(json!({
            "sessionId": session_id,
            "events": events,
        }))
    }
}
