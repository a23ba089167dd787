//! Shared state handed to every handler.

use std::sync::Arc;

use chronicle_context::SessionContextManager;

/// Dependencies available to handlers.
#[derive(Clone)]
pub struct RpcContext {
    /// Per-session context coordinator.
    pub manager: Arc<SessionContextManager>,
}

impl RpcContext {
    /// Context over `manager`.
    pub fn new(manager: Arc<SessionContextManager>) -> Self {
        Self { manager }
    }
}
