//! Presence tracking for viewers across flaky reconnects.
//!
//! DESIGN
//! ======
//! Split in two layers:
//! - [`Presence`] is a plain owned state machine. It knows nothing about
//!   time or sockets and is driven by `register`, `disconnect` and `expire`.
//! - [`PresenceTracker`] wraps it in a mutex, owns one grace timer task per
//!   viewer and turns state transitions into frames on the [`Relay`].
//!
//! STATES
//! ======
//! Absent (not in the map) → Connected on register.
//! Connected → Grace when its current session closes.
//! Grace → Connected on register (timer aborted, no notification).
//! Grace → Absent when the timer fires with a matching generation.
//!
//! A viewer is announced with `viewer:joined` once per presence lifetime:
//! re-registering while Connected or in Grace is silent. After a full leave
//! the viewer is forgotten and its next register counts as a fresh join.
//!
//! Timers capture the viewer id and a generation by value. Cancellation is
//! best-effort (the task may already be past its sleep), so expiry also
//! re-checks the generation under the lock before acting.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use frames::{Data, Frame, SYSCALL_JOINED, SYSCALL_LEFT, ViewerId};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::relay::{RELAY_LABEL, Relay, SessionId};

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// Live on `session`, the most recent session to register this viewer.
    Connected { session: SessionId },
    /// Disconnected and waiting out the grace period tagged `generation`.
    Grace { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First registration in this presence lifetime. `count` includes the viewer.
    Joined { count: usize },
    /// Already known; the registration is silent.
    Resumed,
}

#[derive(Debug, Default)]
pub struct Presence {
    viewers: HashMap<ViewerId, ViewerState>,
    registered: HashSet<ViewerId>,
    next_generation: u64,
}

impl Presence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `viewer` live on `session`. Last register wins.
    pub fn register(&mut self, viewer: ViewerId, session: SessionId) -> RegisterOutcome {
        self.viewers.insert(viewer.clone(), ViewerState::Connected { session });
        if self.registered.insert(viewer) {
            RegisterOutcome::Joined { count: self.connected_count() }
        } else {
            RegisterOutcome::Resumed
        }
    }

    /// Move `viewer` into grace if `session` is its current session.
    ///
    /// Returns the grace generation to hand to a timer, or `None` when the
    /// disconnect came from a superseded session (or an unknown viewer).
    pub fn disconnect(&mut self, viewer: &ViewerId, session: SessionId) -> Option<u64> {
        let state = self.viewers.get_mut(viewer)?;
        if *state != (ViewerState::Connected { session }) {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        *state = ViewerState::Grace { generation };
        Some(generation)
    }

    /// Finish a grace period. Returns true when the viewer actually left.
    pub fn expire(&mut self, viewer: &ViewerId, generation: u64) -> bool {
        if self.viewers.get(viewer) != Some(&ViewerState::Grace { generation }) {
            return false;
        }
        self.viewers.remove(viewer);
        self.registered.remove(viewer);
        true
    }

    #[must_use]
    pub fn state(&self, viewer: &ViewerId) -> Option<ViewerState> {
        self.viewers.get(viewer).copied()
    }

    #[must_use]
    pub fn is_registered(&self, viewer: &ViewerId) -> bool {
        self.registered.contains(viewer)
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.viewers
            .values()
            .filter(|s| matches!(s, ViewerState::Connected { .. }))
            .count()
    }
}

// =============================================================================
// TRACKER
// =============================================================================

struct Inner {
    presence: Presence,
    timers: HashMap<ViewerId, (u64, AbortHandle)>,
}

/// Shared presence service used by every WebSocket session.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Mutex<Inner>>,
    relay: Relay,
    grace: Duration,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(relay: Relay, grace: Duration) -> Self {
        let inner = Inner { presence: Presence::new(), timers: HashMap::new() };
        Self { inner: Arc::new(Mutex::new(inner)), relay, grace }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded state stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register `viewer` on `session`, cancelling any pending grace timer.
    pub fn register(&self, viewer: ViewerId, session: SessionId) -> RegisterOutcome {
        let mut inner = self.lock();
        if let Some((_, timer)) = inner.timers.remove(&viewer) {
            timer.abort();
            debug!(%viewer, "presence: grace cancelled");
        }
        let outcome = inner.presence.register(viewer.clone(), session);
        match outcome {
            RegisterOutcome::Joined { count } => info!(%viewer, %session, count, "presence: viewer joined"),
            RegisterOutcome::Resumed => debug!(%viewer, %session, "presence: viewer resumed"),
        }
        outcome
    }

    /// Handle the close of `session`, which had registered `viewer`.
    pub fn disconnect(&self, viewer: &ViewerId, session: SessionId) {
        let mut inner = self.lock();
        let Some(generation) = inner.presence.disconnect(viewer, session) else {
            debug!(%viewer, %session, "presence: stale session closed");
            return;
        };

        let tracker = self.clone();
        let owned = viewer.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(tracker.grace).await;
            tracker.expire(owned, generation).await;
        });

        if let Some((_, previous)) = inner.timers.insert(viewer.clone(), (generation, task.abort_handle())) {
            previous.abort();
        }
        info!(%viewer, %session, generation, grace_ms = self.grace.as_millis(), "presence: grace started");
    }

    async fn expire(&self, viewer: ViewerId, generation: u64) {
        let left = {
            let mut inner = self.lock();
            if inner.timers.get(&viewer).is_some_and(|(g, _)| *g == generation) {
                inner.timers.remove(&viewer);
            }
            inner.presence.expire(&viewer, generation)
        };
        if !left {
            return;
        }

        info!(%viewer, "presence: viewer left");
        self.relay.broadcast(&left_frame(&viewer)).await;
    }

    #[must_use]
    pub fn state(&self, viewer: &ViewerId) -> Option<ViewerState> {
        self.lock().presence.state(viewer)
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.lock().presence.connected_count()
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// Notification for the registering session only.
#[must_use]
pub fn joined_frame(viewer: &ViewerId, count: usize) -> Frame {
    Frame::request(SYSCALL_JOINED, Data::new())
        .with_from(RELAY_LABEL)
        .with_data("id", viewer.as_str())
        .with_data("count", count)
}

#[must_use]
pub fn left_frame(viewer: &ViewerId) -> Frame {
    Frame::request(SYSCALL_LEFT, Data::new())
        .with_from(RELAY_LABEL)
        .with_data("id", viewer.as_str())
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
