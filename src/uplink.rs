//! Uplink ingestion from the IoT gateway broker.
//!
//! DESIGN
//! ======
//! One MQTT session per process. The adapter subscribes to every device of
//! the configured application and forwards each uplink's raw payload bytes,
//! unmodified, to the [`Relay`].
//!
//! ERROR HANDLING
//! ==============
//! Nothing here is fatal. Broker errors are logged and the event loop polls
//! again after a short pause, which is also how the client reconnects.
//! Malformed messages are logged and dropped without a broadcast.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::UplinkConfig;
use crate::relay::Relay;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 100;

/// One decoded uplink message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    pub device_id: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("invalid uplink json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("uplink has no payload")]
    EmptyPayload,
}

/// Gateway uplink message. Only the fields the relay needs.
#[derive(Deserialize)]
struct UplinkMessage {
    dev_id: String,
    #[serde(default)]
    payload_raw: Option<String>,
}

/// Parse one broker publish into an [`Uplink`].
///
/// # Errors
///
/// Fails on malformed JSON, bad base64, or a missing/empty payload.
pub fn parse_uplink(bytes: &[u8]) -> Result<Uplink, UplinkError> {
    let msg: UplinkMessage = serde_json::from_slice(bytes)?;
    let raw = msg.payload_raw.unwrap_or_default();
    let payload = STANDARD.decode(raw.trim())?;
    if payload.is_empty() {
        return Err(UplinkError::EmptyPayload);
    }
    Ok(Uplink { device_id: msg.dev_id, payload })
}

/// Start the ingestion loop in the background.
pub fn spawn(config: UplinkConfig, relay: Relay) -> JoinHandle<()> {
    tokio::spawn(run(config, relay))
}

async fn run(config: UplinkConfig, relay: Relay) {
    let client_id = format!("sensorstream-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    options.set_credentials(config.app_id.clone(), config.access_key.clone());

    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let topic = config.topic();
    info!(host = %config.host, port = config.port, %topic, "uplink: connecting");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // Clean sessions drop subscriptions, so subscribe on every connect.
                if let Err(e) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
                    warn!(error = %e, %topic, "uplink: subscribe failed");
                } else {
                    info!(%topic, "uplink: connected");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&relay, &publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "uplink: connection error");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Relay one publish. Returns how many sessions accepted the reading.
pub async fn handle_publish(relay: &Relay, topic: &str, bytes: &[u8]) -> usize {
    match parse_uplink(bytes) {
        Ok(uplink) => {
            info!(%topic, device_id = %uplink.device_id, "uplink: received");
            relay.broadcast_reading(&uplink).await
        }
        Err(e) => {
            warn!(%topic, error = %e, "uplink: dropped malformed message");
            0
        }
    }
}

#[cfg(test)]
#[path = "uplink_test.rs"]
mod tests;
