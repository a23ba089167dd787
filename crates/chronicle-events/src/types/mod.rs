//! Event type definitions.
//!
//! - [`EventType`]: closed set of persisted event type discriminators.
//! - [`SessionEvent`]: flat struct with base fields + canonical `payload` JSON.
//! - [`SessionEventPayload`]: typed payload, one variant per event type.
//! - [`NewSessionEvent`]: append request; the only way events enter the log.
//! - [`SessionRecord`]: per-session bookkeeping (root, head, fork origin).

#[macro_use]
mod macros;

pub mod base;
pub mod generated;
pub mod payloads;

pub use base::{NewSessionEvent, SessionEvent, SessionRecord};
pub use generated::{EventType, SessionEventPayload, ALL_EVENT_TYPES};
