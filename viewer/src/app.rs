//! Viewer application: wires dispatcher events to the console, the
//! connection indicator and the graph window, and drives the frame loop.
//!
//! ARCHITECTURE
//! ============
//! Two cooperative tasks on the same `LocalSet` share one
//! `Rc<RefCell<Window>>`:
//!
//! ```text
//! socket task ── ReadingReceived ──> App listener ── push_reading ──┐
//!                                                                   v
//! FrameLoop  ── every FRAME_INTERVAL_MS ── draw_frame(window, surface)
//! ```
//!
//! Neither side holds the borrow across an await, so a tick and a reading
//! never overlap.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use graph::consts::FRAME_INTERVAL_MS;
use graph::render::{Surface, draw_frame};
use graph::svg::SvgSurface;
use graph::window::{Viewport, Window};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, EventKind, ListenerId, ViewerEvent};

/// Lines kept by the console before the oldest are dropped.
pub const CONSOLE_CAPACITY: usize = 200;

// =============================================================================
// CONSOLE
// =============================================================================

/// Human-readable activity log shown to the person watching.
#[derive(Clone, Default)]
pub struct Console {
    lines: Rc<RefCell<VecDeque<String>>>,
    echo: bool,
}

impl Console {
    /// `echo` also prints every line to stdout.
    #[must_use]
    pub fn new(echo: bool) -> Self {
        Self { lines: Rc::default(), echo }
    }

    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!(console = %line);
        if self.echo {
            println!("{line}");
        }
        let mut lines = self.lines.borrow_mut();
        if lines.len() == CONSOLE_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().iter().cloned().collect()
    }
}

// =============================================================================
// APP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Event listeners plus the state they update.
pub struct App {
    dispatcher: Dispatcher,
    window: Rc<RefCell<Window>>,
    status: Rc<Cell<ConnectionStatus>>,
    console: Console,
    listeners: Vec<(EventKind, ListenerId)>,
}

impl App {
    /// Create the graph window and subscribe to every viewer event.
    #[must_use]
    pub fn attach(dispatcher: &Dispatcher, viewport: Viewport, console: Console) -> Self {
        console.log("Initializing graph");
        let window = Rc::new(RefCell::new(Window::new(viewport)));
        let status = Rc::new(Cell::new(ConnectionStatus::Connecting));
        let mut listeners = Vec::new();

        {
            let (status, console) = (Rc::clone(&status), console.clone());
            let kind = EventKind::ConnectionEstablished;
            listeners.push((kind, dispatcher.on(kind, move |_| {
                status.set(ConnectionStatus::Connected);
                console.log("Connection with server established");
            })));
        }
        {
            let (status, console) = (Rc::clone(&status), console.clone());
            let kind = EventKind::ConnectionLost;
            listeners.push((kind, dispatcher.on(kind, move |_| {
                status.set(ConnectionStatus::Disconnected);
                console.log("Lost connection with server");
            })));
        }
        {
            let (window, console) = (Rc::clone(&window), console.clone());
            let kind = EventKind::ReadingReceived;
            listeners.push((kind, dispatcher.on(kind, move |event| {
                if let ViewerEvent::ReadingReceived(value) = event {
                    console.log(format!("Uplink received. Payload: {value}"));
                    window.borrow_mut().push_reading(*value);
                }
            })));
        }
        {
            let console = console.clone();
            let kind = EventKind::ViewerJoined;
            listeners.push((kind, dispatcher.on(kind, move |event| {
                if let ViewerEvent::ViewerJoined { id, count } = event {
                    console.log(format!("Viewer {id} joined ({count} watching)"));
                }
            })));
        }
        {
            let console = console.clone();
            let kind = EventKind::ViewerLeft;
            listeners.push((kind, dispatcher.on(kind, move |event| {
                if let ViewerEvent::ViewerLeft { id } = event {
                    console.log(format!("Viewer {id} left"));
                }
            })));
        }

        Self { dispatcher: dispatcher.clone(), window, status, console, listeners }
    }

    #[must_use]
    pub fn window(&self) -> Rc<RefCell<Window>> {
        Rc::clone(&self.window)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    #[must_use]
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Unsubscribe every listener. Events emitted afterwards leave the app untouched.
    pub fn detach(self) {
        for (kind, id) in self.listeners {
            self.dispatcher.off(kind, id);
        }
    }
}

// =============================================================================
// FRAME LOOP
// =============================================================================

/// Steps and draws the shared window onto a [`Surface`] at frame rate.
pub struct FrameLoop<S> {
    window: Rc<RefCell<Window>>,
    surface: S,
    frames: u64,
}

impl<S: Surface> FrameLoop<S> {
    #[must_use]
    pub fn new(window: Rc<RefCell<Window>>, surface: S) -> Self {
        Self { window, surface, frames: 0 }
    }

    /// Draw one frame. Returns the number of frames drawn so far.
    pub fn tick(&mut self) -> u64 {
        draw_frame(&mut self.window.borrow_mut(), &mut self.surface);
        self.frames += 1;
        self.frames
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Tick forever, calling `after_frame` once per drawn frame.
    pub async fn run(mut self, mut after_frame: impl FnMut(&S, u64)) {
        let mut ticker = interval(Duration::from_millis(FRAME_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let frame = self.tick();
            after_frame(&self.surface, frame);
        }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Periodically writes the SVG surface to a file.
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
    every: u64,
}

impl Snapshot {
    /// `every` is clamped to at least one frame.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, every: u64) -> Self {
        Self { path: path.into(), every: every.max(1) }
    }

    /// Write `svg` if `frame` falls on the snapshot interval. Returns whether
    /// a file was written.
    pub fn maybe_write(&self, svg: &SvgSurface, frame: u64) -> bool {
        if frame % self.every != 0 {
            return false;
        }
        // Write-then-rename keeps readers from seeing a half-written file.
        let tmp = self.path.with_extension("svg.tmp");
        let result = std::fs::write(&tmp, svg.document()).and_then(|()| std::fs::rename(&tmp, &self.path));
        match result {
            Ok(()) => {
                debug!(path = %self.path.display(), frame, "graph: snapshot written");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "graph: snapshot failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
