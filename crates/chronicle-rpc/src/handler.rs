//! Handler trait and envelope wrapping.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::context::RpcContext;
use crate::errors::{INTERNAL_ERROR, RpcError};
use crate::types::{RpcRequest, RpcResponse};

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Run `handler` for `request` and wrap the outcome in a response.
#[instrument(skip_all, fields(method = %request.method, id = %request.id))]
pub async fn handle_request(
    handler: &dyn MethodHandler,
    request: RpcRequest,
    ctx: &RpcContext,
) -> RpcResponse {
    match handler.handle(request.params, ctx).await {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(err) => {
            if err.code() == INTERNAL_ERROR {
                warn!(code = err.code(), error = %err, "rpc request failed");
            } else {
                debug!(code = err.code(), error = %err, "rpc request rejected");
            }
            RpcResponse::failure(request.id, &err)
        }
    }
}
