//! The [`EventStore`]: identity, ordering, forks, and window derivation.

mod event_store;
mod window;

pub use event_store::{
    CreateSessionOptions, EventStore, ForkContext, ListEventsOptions, PendingEvent,
};
pub use window::walk_effective_window;
