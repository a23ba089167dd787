//! Todo lookup for context clears.
//!
//! Clearing the context drops whatever todo list the window carried. The
//! manager asks a [`TodoStore`] for the items still open so the caller can
//! re-surface them.

use chronicle_events::payloads::TodoItem;
use chronicle_events::{EventType, SessionEvent, SessionEventPayload};

/// Error type returned by todo collaborators.
pub type TodoStoreError = Box<dyn std::error::Error + Send + Sync>;

/// Source of todo items scoped to a window.
#[cfg_attr(test, mockall::automock)]
pub trait TodoStore: Send + Sync {
    /// Open todo items belonging to `window`.
    fn todos_for_window(
        &self,
        session_id: &str,
        window: &[SessionEvent],
    ) -> Result<Vec<TodoItem>, TodoStoreError>;
}

/// Reads todos straight from the newest `todo.write` in the window.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventTodoStore;

impl TodoStore for EventTodoStore {
    fn todos_for_window(
        &self,
        _session_id: &str,
        window: &[SessionEvent],
    ) -> Result<Vec<TodoItem>, TodoStoreError> {
        let Some(latest) = window
            .iter()
            .rev()
            .find(|e| e.event_type == EventType::TodoWrite)
        else {
            return Ok(Vec::new());
        };
        match latest.typed_payload()? {
            SessionEventPayload::TodoWrite(write) => {
                Ok(write.todos.into_iter().filter(TodoItem::is_open).collect())
            }
            other => Err(format!("expected todo.write payload, got {}", other.event_type()).into()),
        }
    }
}
