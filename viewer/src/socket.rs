//! Reconnecting WebSocket connection to the relay.
//!
//! ARCHITECTURE
//! ============
//! [`Transport::start`] resolves the viewer's durable id and spawns one local
//! task that owns the socket for the life of the process:
//!
//! ```text
//! loop {
//!     connect ── ok ──> emit ConnectionEstablished
//!        │              send viewer:register
//!        │              pump frames <-> events until the socket drops
//!        │              emit ConnectionLost
//!        └─ err ─> count failure (may fall back to a plain text handshake)
//!     sleep(backoff)
//! }
//! ```
//!
//! The [`Transport`] handle talks to that task over a command channel, so
//! latency probes issued while disconnected are sent on the next connect.
//! Dropping the handle stops the task.

use std::time::Instant;

use frames::{Data, Frame, SYSCALL_PING, ViewerId};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, ViewerEvent};
use crate::identity::{ViewerIdStore, obtain};
use crate::transport::{TransportCore, TransportError, TransportOptions, decode_message, register_frame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Ping(oneshot::Sender<std::time::Duration>),
}

enum SessionEnd {
    /// The socket went away; reconnect.
    Disconnected,
    /// The command channel closed; stop.
    Shutdown,
}

/// Handle to the background connection task.
pub struct Transport {
    viewer: ViewerId,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Transport {
    /// Obtain the viewer id and start connecting.
    ///
    /// Must be called inside a `tokio::task::LocalSet`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Identity`] if the id store fails.
    pub fn start(
        options: TransportOptions,
        store: &impl ViewerIdStore,
        dispatcher: Dispatcher,
    ) -> Result<Self, TransportError> {
        let viewer = obtain(store)?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_local(run(options, viewer.clone(), dispatcher, command_rx));
        Ok(Self { viewer, commands, task })
    }

    #[must_use]
    pub fn viewer_id(&self) -> &ViewerId {
        &self.viewer
    }

    /// Round-trip time of one `session:ping`.
    ///
    /// Never times out on its own; wrap in `tokio::time::timeout` to bound it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the connection task has stopped.
    pub async fn measure_latency(&self) -> Result<std::time::Duration, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Ping(tx)).map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// CONNECTION LOOP
// =============================================================================

async fn run(
    options: TransportOptions,
    viewer: ViewerId,
    dispatcher: Dispatcher,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut core = TransportCore::new(&options);

    loop {
        let attempt = match core.handshake_request(&options.url) {
            Ok(request) => connect_async(request).await.map_err(|e| TransportError::Connect(Box::new(e))),
            Err(e) => Err(e),
        };

        match attempt {
            Ok((socket, _)) => {
                core.on_connected();
                info!(url = %options.url, viewer = %viewer, negotiation = ?core.negotiation(), "ws: connected");
                dispatcher.emit(&ViewerEvent::ConnectionEstablished);

                let end = connect_and_run(socket, &viewer, &dispatcher, &mut core, &mut commands).await;
                dispatcher.emit(&ViewerEvent::ConnectionLost);

                match end {
                    Ok(SessionEnd::Shutdown) => {
                        info!("ws: transport shut down");
                        return;
                    }
                    Ok(SessionEnd::Disconnected) => info!("ws: disconnected"),
                    Err(e) => warn!(error = %e, "ws: connection error"),
                }
            }
            Err(e) => {
                core.on_failed();
                warn!(error = %e, failures = core.failures(), "ws: connect failed");
            }
        }

        let delay = core.next_delay();
        info!(delay_ms = delay.as_millis(), "ws: reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// Pump one live connection until it drops.
async fn connect_and_run(
    socket: Socket,
    viewer: &ViewerId,
    dispatcher: &Dispatcher,
    core: &mut TransportCore,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<SessionEnd, TransportError> {
    let (mut sink, mut stream) = socket.split();

    // Registration goes out on every connect; the relay treats repeats as silent.
    let register = core.encode(&register_frame(viewer))?;
    sink.send(register).await.map_err(socket_err)?;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(msg) = msg else { return Ok(SessionEnd::Disconnected) };
                let msg = msg.map_err(socket_err)?;
                if matches!(msg, Message::Close(_)) {
                    return Ok(SessionEnd::Disconnected);
                }
                match decode_message(&msg) {
                    Some(Ok(frame)) => {
                        if let Some(event) = core.handle_inbound(&frame, Instant::now()) {
                            dispatcher.emit(&event);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "ws: dropped undecodable message"),
                    None => {}
                }
            }
            cmd = commands.recv() => {
                let Some(Command::Ping(reply)) = cmd else {
                    // Best-effort close; the peer may already be gone.
                    if let Err(e) = sink.close().await {
                        warn!(error = %e, "ws: close failed");
                    }
                    return Ok(SessionEnd::Shutdown);
                };
                let ping = Frame::request(SYSCALL_PING, Data::new()).with_from(viewer.as_str());
                core.track_ping(ping.id.clone(), reply, Instant::now());
                sink.send(core.encode(&ping)?).await.map_err(socket_err)?;
            }
        }
    }
}

fn socket_err(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::Socket(Box::new(e))
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
