//! Message payloads.
//!
//! `content` is kept as JSON: either a plain string or an array of content
//! blocks (`text`, `thinking`, `tool_use`, `tool_result`, `image`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::generated::EventType;

/// Payload for `message.user` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    /// String or content-block array.
    pub content: Value,
    /// Turn number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<i64>,
}

impl UserMessagePayload {
    /// Plain-text user message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Value::String(text.into()),
            turn: None,
        }
    }
}

/// Payload for `message.assistant` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessagePayload {
    /// String or content-block array.
    pub content: Value,
    /// Turn number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<i64>,
    /// Model that produced the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider-reported usage for the turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl AssistantMessagePayload {
    /// Plain-text assistant message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Value::String(text.into()),
            turn: None,
            model: None,
            token_usage: None,
        }
    }
}

/// Payload for `message.system` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessagePayload {
    /// Injected text.
    pub content: String,
    /// What injected it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Payload for `message.deleted` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    /// Retracted event.
    pub target_event_id: String,
    /// Type of the retracted event.
    pub target_type: EventType,
    /// Why it was retracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Token usage reported by an LLM provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Tokens read from prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
}
