//! In-process event dispatcher for the viewer.
//!
//! DESIGN
//! ======
//! Components talk through typed [`ViewerEvent`]s instead of calling each
//! other. A [`Dispatcher`] is created once in `main` and cloned into every
//! component that needs it; clones share one listener registry.
//!
//! Emission is synchronous: `emit` runs every handler for the event's kind,
//! in registration order, before returning. Handlers may call `on`/`off`
//! while an emit is in flight because emit iterates a snapshot taken when it
//! starts. A listener added mid-emit is first called by the next emit; one
//! removed mid-emit still receives the event being delivered.
//!
//! Single-threaded by construction (`Rc`/`RefCell`), matching the viewer's
//! current-thread runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use frames::ViewerId;

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    ConnectionEstablished,
    ConnectionLost,
    /// One sensor sample, the first byte of an uplink payload.
    ReadingReceived(u8),
    ViewerJoined { id: ViewerId, count: usize },
    ViewerLeft { id: ViewerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionEstablished,
    ConnectionLost,
    ReadingReceived,
    ViewerJoined,
    ViewerLeft,
}

impl ViewerEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionEstablished => EventKind::ConnectionEstablished,
            Self::ConnectionLost => EventKind::ConnectionLost,
            Self::ReadingReceived(_) => EventKind::ReadingReceived,
            Self::ViewerJoined { .. } => EventKind::ViewerJoined,
            Self::ViewerLeft { .. } => EventKind::ViewerLeft,
        }
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Handle returned by [`Dispatcher::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Rc<dyn Fn(&ViewerEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Handler)>>,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Rc<RefCell<Registry>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&ViewerEvent) + 'static) -> ListenerId {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.entry(kind).or_default().push((id, Rc::new(handler)));
        id
    }

    /// Remove a listener. Returns false when it was not registered.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(list) = registry.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    /// Deliver `event` to every listener of its kind. Returns how many ran.
    pub fn emit(&self, event: &ViewerEvent) -> usize {
        let snapshot: Vec<Handler> = self
            .registry
            .borrow()
            .listeners
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.borrow().listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
