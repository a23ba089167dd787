//! # chronicle-core
//!
//! Shared vocabulary for the chronicle crates:
//!
//! - **Branded IDs**: `EventId`, `SessionId`, `WorkspaceId` as prefixed newtypes
//! - **Logging**: [`logging::init_subscriber`] for the process-wide `tracing` subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{EventId, SessionId, WorkspaceId};
