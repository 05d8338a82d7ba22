use super::*;
use std::cell::{Cell, RefCell};

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn handlers_run_in_registration_order_with_same_payload() {
    let dispatcher = Dispatcher::new();
    let seen = log();

    for name in ["first", "second", "third"] {
        let seen = Rc::clone(&seen);
        dispatcher.on(EventKind::ReadingReceived, move |event| {
            seen.borrow_mut().push(format!("{name}:{event:?}"));
        });
    }

    assert_eq!(dispatcher.emit(&ViewerEvent::ReadingReceived(42)), 3);
    assert_eq!(
        *seen.borrow(),
        vec![
            "first:ReadingReceived(42)".to_owned(),
            "second:ReadingReceived(42)".to_owned(),
            "third:ReadingReceived(42)".to_owned(),
        ]
    );
}

#[test]
fn emit_only_reaches_matching_kind() {
    let dispatcher = Dispatcher::new();
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    dispatcher.on(EventKind::ConnectionLost, move |_| h.set(h.get() + 1));

    assert_eq!(dispatcher.emit(&ViewerEvent::ConnectionEstablished), 0);
    assert_eq!(hits.get(), 0);
    dispatcher.emit(&ViewerEvent::ConnectionLost);
    assert_eq!(hits.get(), 1);
}

#[test]
fn off_removes_only_that_listener() {
    let dispatcher = Dispatcher::new();
    let seen = log();
    let a = {
        let seen = Rc::clone(&seen);
        dispatcher.on(EventKind::ConnectionEstablished, move |_| seen.borrow_mut().push("a".into()))
    };
    {
        let seen = Rc::clone(&seen);
        dispatcher.on(EventKind::ConnectionEstablished, move |_| seen.borrow_mut().push("b".into()));
    }

    assert!(dispatcher.off(EventKind::ConnectionEstablished, a));
    dispatcher.emit(&ViewerEvent::ConnectionEstablished);
    assert_eq!(*seen.borrow(), vec!["b".to_owned()]);
}

#[test]
fn off_unknown_listener_is_noop() {
    let dispatcher = Dispatcher::new();
    let id = dispatcher.on(EventKind::ViewerLeft, |_| {});

    assert!(!dispatcher.off(EventKind::ViewerJoined, id));
    assert!(dispatcher.off(EventKind::ViewerLeft, id));
    assert!(!dispatcher.off(EventKind::ViewerLeft, id));
    assert_eq!(dispatcher.listener_count(EventKind::ViewerLeft), 0);
}

#[test]
fn emit_without_listeners_returns_zero() {
    assert_eq!(Dispatcher::new().emit(&ViewerEvent::ReadingReceived(1)), 0);
}

#[test]
fn listener_added_during_emit_waits_for_next_emit() {
    let dispatcher = Dispatcher::new();
    let late_hits = Rc::new(Cell::new(0));

    {
        let d = dispatcher.clone();
        let late_hits = Rc::clone(&late_hits);
        dispatcher.on(EventKind::ReadingReceived, move |_| {
            let late_hits = Rc::clone(&late_hits);
            d.on(EventKind::ReadingReceived, move |_| late_hits.set(late_hits.get() + 1));
        });
    }

    assert_eq!(dispatcher.emit(&ViewerEvent::ReadingReceived(1)), 1);
    assert_eq!(late_hits.get(), 0);

    dispatcher.emit(&ViewerEvent::ReadingReceived(2));
    assert_eq!(late_hits.get(), 1);
}

#[test]
fn listener_can_remove_itself_during_emit() {
    let dispatcher = Dispatcher::new();
    let hits = Rc::new(Cell::new(0));
    let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

    let id = {
        let d = dispatcher.clone();
        let hits = Rc::clone(&hits);
        let slot = Rc::clone(&slot);
        dispatcher.on(EventKind::ConnectionLost, move |_| {
            hits.set(hits.get() + 1);
            if let Some(id) = slot.get() {
                d.off(EventKind::ConnectionLost, id);
            }
        })
    };
    slot.set(Some(id));

    dispatcher.emit(&ViewerEvent::ConnectionLost);
    dispatcher.emit(&ViewerEvent::ConnectionLost);
    assert_eq!(hits.get(), 1);
}

#[test]
fn clones_share_one_registry() {
    let dispatcher = Dispatcher::new();
    let clone = dispatcher.clone();
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    clone.on(EventKind::ViewerJoined, move |_| h.set(h.get() + 1));

    dispatcher.emit(&ViewerEvent::ViewerJoined { id: ViewerId::new("v"), count: 1 });
    assert_eq!(hits.get(), 1);
}
