//! Per-session concurrency gate.
//!
//! Two independent pieces of state per session:
//!
//! - a **phase** (`Previewing`, `Committing`, `Clearing`; absent = idle).
//!   Only one phase may be held at a time. A second caller is rejected
//!   immediately with `InvalidOperation` rather than queued.
//! - an **exclusive lock** serializing every log mutation (appends, confirm,
//!   clear, fork). Reads never take it.
//!
//! Phases are released by [`PhaseGuard`] on drop, so every exit path
//! (success, error, panic, cancelled future) returns the session to idle.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::{ContextError, Result};

/// Non-idle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePhase {
    /// A preview is generating a candidate summary.
    Previewing,
    /// A confirm is committing a compaction.
    Committing,
    /// A context clear is in progress.
    Clearing,
}

impl GatePhase {
    fn describe(self) -> &'static str {
        match self {
            Self::Previewing => "compaction preview",
            Self::Committing => "compaction commit",
            Self::Clearing => "context clear",
        }
    }
}

/// Phase table and per-session mutation locks.
#[derive(Default)]
pub struct SessionGate {
    phases: DashMap<String, GatePhase>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionGate {
    /// Empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `phase`, failing if the session already holds one.
    pub fn enter(&self, session_id: &str, phase: GatePhase) -> Result<PhaseGuard<'_>> {
        match self.phases.entry(session_id.to_string()) {
            Entry::Occupied(held) => Err(ContextError::InvalidOperation(format!(
                "{} already in progress for session {session_id}",
                held.get().describe()
            ))),
            Entry::Vacant(slot) => {
                let _ = slot.insert(phase);
                debug!(session_id, ?phase, "session phase entered");
                Ok(PhaseGuard {
                    gate: self,
                    session_id: session_id.to_string(),
                })
            }
        }
    }

    /// Phase currently held, if any.
    pub fn phase(&self, session_id: &str) -> Option<GatePhase> {
        self.phases.get(session_id).map(|p| *p)
    }

    /// Acquire the session's mutation lock.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the session's lock entry if nobody holds or awaits it.
    ///
    /// Returns whether the entry was removed. Waiters own a clone of the
    /// mutex, so a contended lock is never replaced by a fresh one.
    pub fn release(&self, session_id: &str) -> bool {
        self.locks
            .remove_if(session_id, |_, mutex| Arc::strong_count(mutex) == 1)
            .is_some()
    }

    /// Number of sessions with a lock entry.
    pub fn tracked_sessions(&self) -> usize {
        self.locks.len()
    }
}

/// Releases a held phase on drop.
#[must_use = "the phase is released as soon as the guard is dropped"]
pub struct PhaseGuard<'a> {
    gate: &'a SessionGate,
    session_id: String,
}

impl std::fmt::Debug for PhaseGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseGuard")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, phase)) = self.gate.phases.remove(&self.session_id) {
            debug!(session_id = %self.session_id, ?phase, "session phase released");
        }
    }
}
