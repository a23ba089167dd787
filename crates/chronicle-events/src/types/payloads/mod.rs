//! Typed payload structs, one module per event domain.

pub mod compact;
pub mod context;
pub mod message;
pub mod session;
pub mod todo;
pub mod tool;

pub use compact::{CompactBoundaryPayload, CompactRange, CompactSummaryPayload};
pub use context::ContextClearedPayload;
pub use message::{
    AssistantMessagePayload, MessageDeletedPayload, SystemMessagePayload, TokenUsage,
    UserMessagePayload,
};
pub use session::{SessionEndPayload, SessionForkPayload, SessionStartPayload};
pub use todo::{TodoItem, TodoWritePayload};
pub use tool::{ToolCallPayload, ToolResultPayload};
