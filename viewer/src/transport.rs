//! Transport state machine: negotiation, backoff and inbound frame handling.
//!
//! DESIGN
//! ======
//! Everything the connection loop decides without touching a socket lives
//! here, so it can be tested without a network:
//! - which encoding to speak ([`Negotiation`]): protobuf over binary messages
//!   first, JSON over text messages once binary keeps failing
//! - what the handshake asks for: binary mode offers the
//!   `SUBPROTOCOL_PROTOBUF` subprotocol, text mode sends a plain upgrade.
//!   A relay or proxy that drops the subprotocol fails every binary
//!   handshake, so falling back to text changes the request that failed
//!   rather than retrying it unchanged
//! - how long to wait before the next attempt (exponential backoff)
//! - what an inbound frame means for the rest of the viewer ([`ViewerEvent`])
//! - which latency probes are still waiting for their reply
//!
//! ERROR HANDLING
//! ==============
//! Bad inbound data never tears the connection down. Undecodable messages and
//! readings with empty or non-hex payloads are logged and dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use frames::{
    CodecError, Data, Frame, SUBPROTOCOL_PROTOBUF, SYSCALL_CONNECTED, SYSCALL_JOINED, SYSCALL_LEFT, SYSCALL_READING,
    SYSCALL_REGISTER, Status, ViewerId,
};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::dispatcher::ViewerEvent;
use crate::identity::IdentityError;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(10_000);
pub const DEFAULT_DOWNGRADE_AFTER: u32 = 2;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("websocket error: {0}")]
    Socket(Box<tungstenite::Error>),
    #[error("transport is shut down")]
    Closed,
    #[error("frame codec failed: {0}")]
    Codec(#[from] CodecError),
    #[error("reading has no payload")]
    EmptyPayload,
    #[error("reading payload is not hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Wire encoding used for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Protobuf frames in binary messages.
    Binary,
    /// JSON frames in text messages. The conservative fallback.
    Text,
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed attempts before switching to [`Negotiation::Text`].
    pub downgrade_after: u32,
    pub negotiation: Negotiation,
}

impl TransportOptions {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            downgrade_after: DEFAULT_DOWNGRADE_AFTER,
            negotiation: Negotiation::Binary,
        }
    }
}

// =============================================================================
// CORE
// =============================================================================

struct PendingPing {
    sent_at: Instant,
    reply: oneshot::Sender<Duration>,
}

pub struct TransportCore {
    negotiation: Negotiation,
    downgrade_after: u32,
    failures: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff: Duration,
    pings: HashMap<String, PendingPing>,
}

impl TransportCore {
    #[must_use]
    pub fn new(options: &TransportOptions) -> Self {
        Self {
            negotiation: options.negotiation,
            downgrade_after: options.downgrade_after,
            failures: 0,
            initial_backoff: options.initial_backoff,
            max_backoff: options.max_backoff,
            backoff: options.initial_backoff,
            pings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn negotiation(&self) -> Negotiation {
        self.negotiation
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// A connection came up: failure streak and backoff start over.
    pub fn on_connected(&mut self) {
        self.failures = 0;
        self.backoff = self.initial_backoff;
    }

    /// A connection attempt failed. Downgrades negotiation once the streak
    /// reaches the threshold.
    pub fn on_failed(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.negotiation == Negotiation::Binary && self.failures >= self.downgrade_after {
            self.negotiation = Negotiation::Text;
            warn!(failures = self.failures, "transport: falling back to text frames");
        }
    }

    /// Delay before the next attempt. Doubles up to the cap on each call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.backoff;
        self.backoff = (self.backoff * 2).min(self.max_backoff);
        delay
    }

    /// Upgrade request for the next attempt. Binary mode offers the protobuf
    /// subprotocol; text mode sends a plain upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if `url` is not a WebSocket URL.
    pub fn handshake_request(&self, url: &str) -> Result<Request, TransportError> {
        let mut request = url.into_client_request().map_err(|e| TransportError::Connect(Box::new(e)))?;
        if self.negotiation == Negotiation::Binary {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL_PROTOBUF));
        }
        Ok(request)
    }

    /// Encode `frame` for the current negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Codec`] if JSON serialization fails.
    pub fn encode(&self, frame: &Frame) -> Result<Message, TransportError> {
        Ok(match self.negotiation {
            Negotiation::Binary => Message::Binary(frames::encode_frame(frame).into()),
            Negotiation::Text => Message::Text(frames::to_json(frame)?.into()),
        })
    }

    /// Remember a latency probe until its reply arrives.
    pub fn track_ping(&mut self, ping_id: String, reply: oneshot::Sender<Duration>, sent_at: Instant) {
        // Callers that gave up dropped their receiver; forget those probes.
        self.pings.retain(|_, p| !p.reply.is_closed());
        self.pings.insert(ping_id, PendingPing { sent_at, reply });
    }

    #[must_use]
    pub fn pending_pings(&self) -> usize {
        self.pings.len()
    }

    /// Interpret one inbound frame. Returns the event to publish, if any.
    pub fn handle_inbound(&mut self, frame: &Frame, now: Instant) -> Option<ViewerEvent> {
        if frame.status.is_terminal() {
            self.resolve_ping(frame, now);
            if frame.status == Status::Error {
                warn!(syscall = %frame.syscall, data = ?frame.data, "transport: server returned error");
            }
            return None;
        }

        match frame.syscall.as_str() {
            SYSCALL_READING => match decode_reading(frame) {
                Ok(value) => Some(ViewerEvent::ReadingReceived(value)),
                Err(e) => {
                    warn!(error = %e, "transport: dropped reading");
                    None
                }
            },
            SYSCALL_JOINED => {
                let id = ViewerId::new(frame.str_field("id")?);
                let count = frame.data.get("count").and_then(serde_json::Value::as_u64).unwrap_or(0);
                Some(ViewerEvent::ViewerJoined { id, count: usize::try_from(count).unwrap_or(usize::MAX) })
            }
            SYSCALL_LEFT => Some(ViewerEvent::ViewerLeft { id: ViewerId::new(frame.str_field("id")?) }),
            SYSCALL_CONNECTED => {
                debug!(session_id = frame.str_field("session_id").unwrap_or("-"), "transport: session opened");
                None
            }
            other => {
                debug!(syscall = other, "transport: ignoring frame");
                None
            }
        }
    }

    fn resolve_ping(&mut self, frame: &Frame, now: Instant) {
        let Some(parent) = frame.parent_id.as_deref() else {
            return;
        };
        let Some(ping) = self.pings.remove(parent) else {
            return;
        };
        let elapsed = now.saturating_duration_since(ping.sent_at);
        if ping.reply.send(elapsed).is_err() {
            debug!("transport: latency probe abandoned by caller");
        } else {
            info!(latency_ms = elapsed.as_millis(), "transport: pong");
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// First byte of a `reading:uplink` frame's hex payload.
///
/// # Errors
///
/// Returns [`TransportError::EmptyPayload`] for a missing or empty payload and
/// [`TransportError::Hex`] for non-hex input.
pub fn decode_reading(frame: &Frame) -> Result<u8, TransportError> {
    let raw = frame.str_field("payload").unwrap_or_default();
    let bytes = hex::decode(raw.trim())?;
    bytes.first().copied().ok_or(TransportError::EmptyPayload)
}

/// Decode one WebSocket message. `None` for control messages.
#[must_use]
pub fn decode_message(msg: &Message) -> Option<Result<Frame, CodecError>> {
    match msg {
        Message::Binary(bytes) => Some(frames::decode_frame(bytes)),
        Message::Text(text) => Some(frames::from_json(text.as_str())),
        _ => None,
    }
}

#[must_use]
pub fn register_frame(viewer: &ViewerId) -> Frame {
    Frame::request(SYSCALL_REGISTER, Data::new())
        .with_from(viewer.as_str())
        .with_data("id", viewer.as_str())
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
