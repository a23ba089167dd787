//! Todo payloads.

use serde::{Deserialize, Serialize};

/// Payload for `todo.write` events: a full snapshot of the todo list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoWritePayload {
    /// Todo items.
    pub todos: Vec<TodoItem>,
    /// What triggered the write.
    pub trigger: String,
}

/// A single todo item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Item ID.
    pub id: String,
    /// Item content/description.
    pub content: String,
    /// Present-tense form shown while the item is active.
    pub active_form: String,
    /// `pending`, `in_progress`, or `completed`.
    pub status: String,
    /// `agent`, `user`, or `skill`.
    pub source: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Completion timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl TodoItem {
    /// Whether the item still needs work.
    pub fn is_open(&self) -> bool {
        self.status != "completed"
    }
}
