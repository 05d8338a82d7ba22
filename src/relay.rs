//! Relay broadcaster: fan-out of frames to live sessions.
//!
//! DESIGN
//! ======
//! Every WebSocket session registers a bounded `mpsc::Sender<Frame>` here.
//! Sends are best-effort `try_send`: a session whose channel is full or
//! closed misses that frame rather than stalling the sender. Each channel is
//! FIFO, so frames submitted to one destination arrive in submission order.
//!
//! The session map sits behind a tokio `RwLock`; the lock is only held while
//! iterating senders and never across a network write.

use std::collections::HashMap;
use std::sync::Arc;

use frames::{Data, Frame, SYSCALL_READING};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::uplink::Uplink;

/// Connection-scoped identifier, minted on upgrade.
pub type SessionId = Uuid;

/// Label stamped into `from` on server-originated frames.
pub const RELAY_LABEL: &str = "relay";

#[derive(Clone, Default)]
pub struct Relay {
    sessions: Arc<RwLock<HashMap<SessionId, mpsc::Sender<Frame>>>>,
}

impl Relay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_session(&self, session_id: SessionId, tx: mpsc::Sender<Frame>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, tx);
        info!(%session_id, sessions = sessions.len(), "relay: session registered");
    }

    pub async fn unregister_session(&self, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&session_id).is_some() {
            info!(%session_id, sessions = sessions.len(), "relay: session removed");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver `frame` to every live session. Returns how many accepted it.
    pub async fn broadcast(&self, frame: &Frame) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for (session_id, tx) in sessions.iter() {
            // Best-effort: a full or closed channel skips this session.
            if tx.try_send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(%session_id, syscall = %frame.syscall, "relay: dropped frame for slow session");
            }
        }
        delivered
    }

    /// Deliver `frame` to a single session. Returns false when it is gone or full.
    pub async fn send_to(&self, session_id: SessionId, frame: Frame) -> bool {
        let sessions = self.sessions.read().await;
        let Some(tx) = sessions.get(&session_id) else {
            return false;
        };
        tx.try_send(frame).is_ok()
    }

    /// Fan one uplink out to every session as a `reading:uplink` frame.
    pub async fn broadcast_reading(&self, uplink: &Uplink) -> usize {
        let frame = reading_frame(uplink);
        let delivered = self.broadcast(&frame).await;
        info!(device_id = %uplink.device_id, bytes = uplink.payload.len(), delivered, "relay: uplink broadcast");
        delivered
    }

    /// Answer a ping on the requesting session only.
    pub async fn respond_ping(&self, session_id: SessionId, ping: &Frame) -> bool {
        self.send_to(session_id, ping.done().with_from(RELAY_LABEL)).await
    }
}

/// Build the wire frame for one uplink. The payload travels hex encoded.
#[must_use]
pub fn reading_frame(uplink: &Uplink) -> Frame {
    Frame::request(SYSCALL_READING, Data::new())
        .with_from(RELAY_LABEL)
        .with_data("payload", hex::encode(&uplink.payload))
        .with_data("device_id", uplink.device_id.clone())
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
