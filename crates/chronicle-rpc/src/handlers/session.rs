//! Session handlers: fork.

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handler::MethodHandler;
use crate::handlers::{opt_string_param, require_string_param, to_json};

/// Branch a new session off an event.
///
/// Params: `eventId`, optional `newSessionId`.
pub struct ForkSessionHandler;

#[async_trait]
impl MethodHandler for ForkSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.fork"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let event_id = require_string_param(params.as_ref(), "eventId")?;
        let new_session_id = opt_string_param(params.as_ref(), "newSessionId")?;
        let fork = ctx
            .manager
            .fork_session(&event_id, new_session_id.as_deref())
            .await?;
        to_json(&fork)
    }
}
