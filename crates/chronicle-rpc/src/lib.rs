//! # chronicle-rpc
//!
//! Adapter between the request/response envelope and
//! [`SessionContextManager`](chronicle_context::SessionContextManager).
//!
//! - [`types`]: `RpcRequest` / `RpcResponse` wire format
//! - [`errors`]: error codes and the [`ContextError`](chronicle_context::ContextError) mapping
//! - [`handlers`]: one [`MethodHandler`] per method
//!
//! Routing method names to handlers is left to the transport.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handler;
pub mod handlers;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use handler::{MethodHandler, handle_request};
pub use types::{RequestId, RpcErrorBody, RpcRequest, RpcResponse};
