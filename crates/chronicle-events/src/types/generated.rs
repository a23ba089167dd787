//! Event type table.
//!
//! Everything here is produced by [`define_events!`]. Add or remove event
//! types by editing the table below.

use serde::{Deserialize, Serialize};

use super::base::SessionEvent;
use super::payloads;

define_events! {
    events {
        /// Root of a session's chain.
        SessionStart => "session.start" => payloads::session::SessionStartPayload,
        /// First event of a session branched from another session's event.
        SessionFork => "session.fork" => payloads::session::SessionForkPayload,
        /// Session closed; no further appends.
        SessionEnd => "session.end" => payloads::session::SessionEndPayload,
        /// User message.
        MessageUser => "message.user" => payloads::message::UserMessagePayload,
        /// Assistant (model) message.
        MessageAssistant => "message.assistant" => payloads::message::AssistantMessagePayload,
        /// System-injected message.
        MessageSystem => "message.system" => payloads::message::SystemMessagePayload,
        /// Retraction of an earlier message.
        MessageDeleted => "message.deleted" => payloads::message::MessageDeletedPayload,
        /// Tool call from the model.
        ToolCall => "tool.call" => payloads::tool::ToolCallPayload,
        /// Tool execution result.
        ToolResult => "tool.result" => payloads::tool::ToolResultPayload,
        /// Compaction cut point.
        CompactBoundary => "compact.boundary" => payloads::compact::CompactBoundaryPayload,
        /// Summary replacing everything before its boundary.
        CompactSummary => "compact.summary" => payloads::compact::CompactSummaryPayload,
        /// Context window reset marker.
        ContextCleared => "context.cleared" => payloads::context::ContextClearedPayload,
        /// Todo list snapshot.
        TodoWrite => "todo.write" => payloads::todo::TodoWritePayload,
    }
    domain_groups {
        /// Whether this is a session lifecycle event (`session.*`).
        is_session_type => [SessionStart, SessionFork, SessionEnd],
        /// Whether this is a conversational message (`message.user|assistant|system`).
        is_message_type => [MessageUser, MessageAssistant, MessageSystem],
        /// Whether this is a tool event (`tool.*`).
        is_tool_type => [ToolCall, ToolResult],
        /// Whether this event starts a fresh window (`compact.*`, `context.cleared`).
        is_window_marker => [CompactBoundary, CompactSummary, ContextCleared],
    }
}
