use super::*;
use frames::{SYSCALL_PING, Status};
use tokio::time::{Duration, timeout};

fn uplink(bytes: &[u8]) -> Uplink {
    Uplink { device_id: "node-1".into(), payload: bytes.to_vec() }
}

async fn recv(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("relay receive timed out")
        .expect("relay channel closed unexpectedly")
}

async fn assert_silent(rx: &mut mpsc::Receiver<Frame>) {
    assert!(timeout(Duration::from_millis(80), rx.recv()).await.is_err(), "expected no frame");
}

#[tokio::test]
async fn reading_reaches_every_session_hex_encoded() {
    let relay = Relay::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    relay.register_session(Uuid::new_v4(), tx_a).await;
    relay.register_session(Uuid::new_v4(), tx_b).await;

    let delivered = relay.broadcast_reading(&uplink(&[0x2a, 0x01])).await;
    assert_eq!(delivered, 2);

    for rx in [&mut rx_a, &mut rx_b] {
        let frame = recv(rx).await;
        assert_eq!(frame.syscall, SYSCALL_READING);
        assert_eq!(frame.str_field("payload"), Some("2a01"));
        assert_eq!(frame.str_field("device_id"), Some("node-1"));
        assert_eq!(frame.from.as_deref(), Some(RELAY_LABEL));
    }
}

#[tokio::test]
async fn per_session_order_matches_submission_order() {
    let relay = Relay::new();
    let (tx, mut rx) = mpsc::channel(16);
    relay.register_session(Uuid::new_v4(), tx).await;

    for byte in [3_u8, 5, 2] {
        relay.broadcast_reading(&uplink(&[byte])).await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(recv(&mut rx).await.str_field("payload").map(str::to_owned));
    }
    assert_eq!(seen, vec![Some("03".into()), Some("05".into()), Some("02".into())]);
}

#[tokio::test]
async fn ping_reply_goes_only_to_requester() {
    let relay = Relay::new();
    let requester = Uuid::new_v4();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    relay.register_session(requester, tx_a).await;
    relay.register_session(Uuid::new_v4(), tx_b).await;

    let ping = Frame::request(SYSCALL_PING, Data::new());
    assert!(relay.respond_ping(requester, &ping).await);

    let pong = recv(&mut rx_a).await;
    assert_eq!(pong.status, Status::Done);
    assert_eq!(pong.parent_id.as_deref(), Some(ping.id.as_str()));
    assert_silent(&mut rx_b).await;
}

#[tokio::test]
async fn full_channel_drops_frame_without_blocking_others() {
    let relay = Relay::new();
    let (slow_tx, mut slow_rx) = mpsc::channel(1);
    let (fast_tx, mut fast_rx) = mpsc::channel(8);
    relay.register_session(Uuid::new_v4(), slow_tx).await;
    relay.register_session(Uuid::new_v4(), fast_tx).await;

    relay.broadcast_reading(&uplink(&[1])).await;
    let delivered = relay.broadcast_reading(&uplink(&[2])).await;
    assert_eq!(delivered, 1);

    assert_eq!(recv(&mut slow_rx).await.str_field("payload"), Some("01"));
    assert_silent(&mut slow_rx).await;
    assert_eq!(recv(&mut fast_rx).await.str_field("payload"), Some("01"));
    assert_eq!(recv(&mut fast_rx).await.str_field("payload"), Some("02"));
}

#[tokio::test]
async fn unregistered_session_receives_nothing() {
    let relay = Relay::new();
    let session = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(8);
    relay.register_session(session, tx).await;
    relay.unregister_session(session).await;

    assert_eq!(relay.session_count().await, 0);
    assert_eq!(relay.broadcast_reading(&uplink(&[9])).await, 0);
    assert!(!relay.send_to(session, Frame::request(SYSCALL_PING, Data::new())).await);
    assert!(rx.recv().await.is_none());
}
