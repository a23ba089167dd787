//! Effective context window derivation.
//!
//! The window is never stored. It is recomputed by walking parent links
//! backward from the session head:
//!
//! - a `compact.boundary` whose paired `compact.summary` has already been
//!   collected ends the walk (the boundary itself is excluded)
//! - a `context.cleared` marker ends the walk (excluded)
//! - a boundary with no visible summary is treated as an in-progress
//!   compaction: it is skipped and the walk continues into the pre-boundary
//!   window
//! - otherwise the walk runs to the root, crossing fork points into the
//!   ancestor session
//!
//! Cost is proportional to the window, not to the whole log.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::{EventStoreError, Result};
use crate::storage::EventStorage;
use crate::types::{EventType, SessionEvent};

/// Walk backward from `head_event_id` and return the window oldest-first.
pub fn walk_effective_window(
    storage: &dyn EventStorage,
    head_event_id: &str,
) -> Result<Vec<SessionEvent>> {
    let mut collected = Vec::new();
    let mut paired_boundaries: HashSet<String> = HashSet::new();
    let mut cursor = Some(head_event_id.to_string());

    while let Some(id) = cursor {
        let event = storage
            .get_event(&id)?
            .ok_or_else(|| EventStoreError::Internal(format!("dangling parent link: {id}")))?;

        match event.event_type {
            EventType::CompactBoundary => {
                if paired_boundaries.contains(&event.id) {
                    break;
                }
                debug!(
                    boundary_id = %event.id,
                    "compaction boundary without visible summary, skipping"
                );
                cursor = event.parent_id;
                continue;
            }
            EventType::ContextCleared => break,
            EventType::CompactSummary => {
                if let Some(boundary) = event.payload_str("boundaryEventId") {
                    let _ = paired_boundaries.insert(boundary.to_string());
                }
            }
            _ => {}
        }

        cursor = event.parent_id.clone();
        collected.push(event);
    }

    collected.reverse();
    Ok(collected)
}
