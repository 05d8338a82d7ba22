//! WebSocket handler for viewer sessions.
//!
//! DESIGN
//! ======
//! On upgrade, generates a session ID, registers an outbound channel with the
//! relay and enters a `select!` loop:
//! - Incoming viewer frames → decode + dispatch by syscall
//! - Relay frames (readings, presence) → forward to the viewer
//!
//! Binary messages carry protobuf frames and text messages carry JSON frames.
//! A session starts in binary mode when the handshake negotiated
//! `SUBPROTOCOL_PROTOBUF` and in text mode otherwise. From then on it
//! remembers the encoding of the last message it received and answers in
//! kind, so a viewer that fell back to text gets text back.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `session_id`
//! 2. `viewer:register` → presence register (+ `viewer:joined` if new)
//! 3. `session:ping` → pong on this session only
//! 4. Close → unregister from relay → presence disconnect (grace starts)

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{
    CodecError, Data, ErrorCode, FRAME_CODE, FRAME_MESSAGE, Frame, SYSCALL_CONNECTED, SYSCALL_GATEWAY_ERROR,
    SUBPROTOCOL_PROTOBUF, SYSCALL_PING, SYSCALL_REGISTER, Status, ViewerId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::presence::{RegisterOutcome, joined_frame};
use crate::relay::{RELAY_LABEL, SessionId};
use crate::state::AppState;

const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireMode {
    Binary,
    Text,
}

/// Per-connection bookkeeping.
struct Session {
    id: SessionId,
    viewer: Option<ViewerId>,
    mode: WireMode,
}

impl Session {
    fn new(id: SessionId, mode: WireMode) -> Self {
        Self { id, viewer: None, mode }
    }
}

#[derive(Debug, thiserror::Error)]
enum WsError {
    #[error("viewer id required")]
    MissingViewerId,
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
}

impl ErrorCode for WsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingViewerId => "E_MISSING_VIEWER_ID",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.protocols([SUBPROTOCOL_PROTOBUF]).on_upgrade(move |socket| run_ws(socket, state))
}

/// Initial encoding for a freshly upgraded socket.
fn negotiated_mode(socket: &WebSocket) -> WireMode {
    match socket.protocol() {
        Some(protocol) if protocol == SUBPROTOCOL_PROTOBUF => WireMode::Binary,
        _ => WireMode::Text,
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut session = Session::new(Uuid::new_v4(), negotiated_mode(&socket));
    let session_id = session.id;

    let (session_tx, mut session_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
    state.relay.register_session(session_id, session_tx).await;

    let welcome = Frame::request(SYSCALL_CONNECTED, Data::new())
        .with_from(RELAY_LABEL)
        .with_data("session_id", session_id.to_string());
    if send_frame(&mut socket, session.mode, &welcome).await.is_ok() {
        info!(%session_id, mode = ?session.mode, "ws: session connected");
        serve(&mut socket, &state, &mut session, &mut session_rx).await;
    }

    state.relay.unregister_session(session_id).await;
    if let Some(viewer) = &session.viewer {
        state.presence.disconnect(viewer, session_id);
    }
    let sessions = state.relay.session_count().await;
    info!(%session_id, sessions, viewers = state.presence.connected_count(), "ws: session disconnected");
}

async fn serve(
    socket: &mut WebSocket,
    state: &AppState,
    session: &mut Session,
    session_rx: &mut mpsc::Receiver<Frame>,
) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let decoded = match msg {
                    Message::Binary(bytes) => {
                        session.mode = WireMode::Binary;
                        frames::decode_frame(&bytes)
                    }
                    Message::Text(text) => {
                        session.mode = WireMode::Text;
                        frames::from_json(text.as_str())
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                for frame in process_inbound(state, session, decoded).await {
                    if send_frame(socket, session.mode, &frame).await.is_err() {
                        return;
                    }
                }
            }
            Some(frame) = session_rx.recv() => {
                if send_frame(socket, session.mode, &frame).await.is_err() {
                    break;
                }
            }
        }
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Process one decoded inbound message and return frames for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound(state: &AppState, session: &mut Session, decoded: Result<Frame, CodecError>) -> Vec<Frame> {
    let mut req = match decoded {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "ws: invalid inbound frame");
            return vec![gateway_error(&e)];
        }
    };

    if req.status != Status::Request {
        debug!(session_id = %session.id, syscall = %req.syscall, status = ?req.status, "ws: ignoring non-request frame");
        return Vec::new();
    }

    if let Some(viewer) = &session.viewer {
        req.from = Some(viewer.to_string());
    }
    debug!(session_id = %session.id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    match req.syscall.as_str() {
        SYSCALL_REGISTER => handle_register(state, session, &req),
        SYSCALL_PING => {
            state.relay.respond_ping(session.id, &req).await;
            Vec::new()
        }
        other => vec![req.error_from(&WsError::UnknownSyscall(other.to_owned()))],
    }
}

fn handle_register(state: &AppState, session: &mut Session, req: &Frame) -> Vec<Frame> {
    let viewer = ViewerId::new(req.str_field("id").unwrap_or_default());
    if viewer.is_empty() {
        return vec![req.error_from(&WsError::MissingViewerId)];
    }

    // A session speaks for one viewer; switching ids releases the old one.
    if let Some(previous) = session.viewer.replace(viewer.clone()) {
        if previous != viewer {
            state.presence.disconnect(&previous, session.id);
        }
    }

    match state.presence.register(viewer.clone(), session.id) {
        RegisterOutcome::Joined { count } => vec![joined_frame(&viewer, count), req.done()],
        RegisterOutcome::Resumed => vec![req.done()],
    }
}

/// Unsolicited error for input that never became a frame.
fn gateway_error(err: &CodecError) -> Frame {
    let mut frame = Frame::request(SYSCALL_GATEWAY_ERROR, Data::new())
        .with_from(RELAY_LABEL)
        .with_data(FRAME_CODE, err.error_code())
        .with_data(FRAME_MESSAGE, err.to_string());
    frame.status = Status::Error;
    frame
}

// =============================================================================
// SEND
// =============================================================================

async fn send_frame(socket: &mut WebSocket, mode: WireMode, frame: &Frame) -> Result<(), ()> {
    let msg = match mode {
        WireMode::Binary => Message::Binary(frames::encode_frame(frame).into()),
        WireMode::Text => match frames::to_json(frame) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                warn!(error = %e, "ws: failed to serialize frame");
                return Err(());
            }
        },
    };

    if frame.status == Status::Error {
        let code = frame.str_field(FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(FRAME_MESSAGE).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, ?mode, "ws: send frame");
    }

    socket.send(msg).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
