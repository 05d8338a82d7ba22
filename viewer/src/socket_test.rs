use super::*;
use crate::dispatcher::EventKind;
use crate::identity::MemoryStore;
use crate::transport::Negotiation;
use frames::{SUBPROTOCOL_PROTOBUF, SYSCALL_READING, SYSCALL_REGISTER};
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::LocalSet;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

const WAIT: Duration = Duration::from_secs(2);

type ServerSocket = WebSocketStream<TcpStream>;

fn options(addr: SocketAddr) -> TransportOptions {
    TransportOptions {
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(80),
        ..TransportOptions::new(format!("ws://{addr}"))
    }
}

/// Record every event the dispatcher publishes.
fn record(dispatcher: &Dispatcher) -> Rc<RefCell<Vec<ViewerEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::ConnectionEstablished,
        EventKind::ConnectionLost,
        EventKind::ReadingReceived,
        EventKind::ViewerJoined,
        EventKind::ViewerLeft,
    ] {
        let events = Rc::clone(&events);
        dispatcher.on(kind, move |e| events.borrow_mut().push(e.clone()));
    }
    events
}

async fn wait_for(events: &Rc<RefCell<Vec<ViewerEvent>>>, want: &ViewerEvent, times: usize) {
    timeout(WAIT, async {
        while events.borrow().iter().filter(|e| *e == want).count() < times {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event never arrived");
}

/// Accept one connection, agreeing to whatever subprotocol the client offers.
async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept()).await.expect("accept timed out").expect("accept");
    let echo = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(protocol) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(resp)
    };
    accept_hdr_async(stream, echo).await.expect("handshake")
}

/// Accept one connection like a relay that knows no subprotocols. Also
/// reports whether the client offered the protobuf subprotocol.
async fn accept_without_subprotocol(listener: &TcpListener) -> (ServerSocket, bool) {
    let (stream, _) = timeout(WAIT, listener.accept()).await.expect("accept timed out").expect("accept");
    let offered = Cell::new(false);
    let inspect = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        offered.set(
            req.headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .is_some_and(|p| p.as_bytes() == SUBPROTOCOL_PROTOBUF.as_bytes()),
        );
        Ok(resp)
    };
    let ws = accept_hdr_async(stream, inspect).await.expect("handshake");
    (ws, offered.get())
}

async fn recv(ws: &mut ServerSocket) -> (Frame, bool) {
    loop {
        let msg = timeout(WAIT, ws.next()).await.expect("recv timed out").expect("stream ended").expect("ws error");
        match msg {
            Message::Binary(bytes) => return (frames::decode_frame(&bytes).expect("decode"), true),
            Message::Text(text) => return (frames::from_json(text.as_str()).expect("parse"), false),
            _ => {}
        }
    }
}

async fn send(ws: &mut ServerSocket, frame: &Frame) {
    ws.send(Message::Binary(frames::encode_frame(frame).into())).await.expect("send");
}

#[tokio::test]
async fn registers_on_connect_and_publishes_readings() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let dispatcher = Dispatcher::new();
            let events = record(&dispatcher);
            let store = MemoryStore::with_id(ViewerId::new("viewer-1"));
            let _transport = Transport::start(options(listener.local_addr().expect("addr")), &store, dispatcher)
                .expect("start");

            let mut server = accept(&listener).await;
            let (register, binary) = recv(&mut server).await;
            assert!(binary);
            assert_eq!(register.syscall, SYSCALL_REGISTER);
            assert_eq!(register.str_field("id"), Some("viewer-1"));
            wait_for(&events, &ViewerEvent::ConnectionEstablished, 1).await;

            let reading = Frame::request(SYSCALL_READING, frames::Data::new()).with_data("payload", "2a");
            send(&mut server, &reading).await;
            wait_for(&events, &ViewerEvent::ReadingReceived(42), 1).await;
        })
        .await;
}

#[tokio::test]
async fn reconnects_and_registers_again_with_same_id() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let dispatcher = Dispatcher::new();
            let events = record(&dispatcher);
            let store = MemoryStore::default();
            let transport = Transport::start(options(listener.local_addr().expect("addr")), &store, dispatcher)
                .expect("start");
            let id = transport.viewer_id().clone();

            let mut first = accept(&listener).await;
            assert_eq!(recv(&mut first).await.0.str_field("id"), Some(id.as_str()));
            drop(first);
            wait_for(&events, &ViewerEvent::ConnectionLost, 1).await;

            let mut second = accept(&listener).await;
            assert_eq!(recv(&mut second).await.0.str_field("id"), Some(id.as_str()));
            wait_for(&events, &ViewerEvent::ConnectionEstablished, 2).await;
        })
        .await;
}

#[tokio::test]
async fn measure_latency_resolves_on_correlated_reply() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let store = MemoryStore::default();
            let transport = Transport::start(options(listener.local_addr().expect("addr")), &store, Dispatcher::new())
                .expect("start");

            let server = tokio::task::spawn_local(async move {
                let mut ws = accept(&listener).await;
                recv(&mut ws).await;
                let (ping, _) = recv(&mut ws).await;
                assert_eq!(ping.syscall, SYSCALL_PING);
                sleep(Duration::from_millis(10)).await;
                send(&mut ws, &ping.done()).await;
                ws
            });

            let latency = timeout(WAIT, transport.measure_latency())
                .await
                .expect("latency timed out")
                .expect("latency");
            assert!(latency >= Duration::from_millis(10));
            drop(server.await.expect("server task"));
        })
        .await;
}

#[tokio::test]
async fn unanswered_ping_stays_pending() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let store = MemoryStore::default();
            let transport = Transport::start(options(listener.local_addr().expect("addr")), &store, Dispatcher::new())
                .expect("start");

            let mut ws = accept(&listener).await;
            recv(&mut ws).await;
            let pending = timeout(Duration::from_millis(150), transport.measure_latency()).await;
            assert!(pending.is_err(), "ping without reply must not resolve");
        })
        .await;
}

#[tokio::test]
async fn falls_back_to_text_after_failed_handshakes() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let dispatcher = Dispatcher::new();
            let events = record(&dispatcher);
            let store = MemoryStore::default();
            let _transport = Transport::start(options(listener.local_addr().expect("addr")), &store, dispatcher)
                .expect("start");

            // Two attempts die before the WebSocket handshake completes.
            for _ in 0..2 {
                let (stream, _) = timeout(WAIT, listener.accept()).await.expect("accept timed out").expect("accept");
                drop(stream);
            }
            assert!(events.borrow().is_empty(), "failed attempts emit nothing");

            let mut ws = accept(&listener).await;
            let (register, binary) = recv(&mut ws).await;
            assert!(!binary, "expected text frames after fallback");
            assert_eq!(register.syscall, SYSCALL_REGISTER);
        })
        .await;
}

#[tokio::test]
async fn relay_without_subprotocol_gets_plain_text_handshake() {
    LocalSet::new()
        .run_until(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let dispatcher = Dispatcher::new();
            let events = record(&dispatcher);
            let store = MemoryStore::default();
            let _transport = Transport::start(options(listener.local_addr().expect("addr")), &store, dispatcher)
                .expect("start");

            // The client refuses an upgrade that ignores the subprotocol it offered.
            for _ in 0..2 {
                let (ws, offered) = accept_without_subprotocol(&listener).await;
                assert!(offered, "binary attempts offer the protobuf subprotocol");
                drop(ws);
            }
            assert!(events.borrow().is_empty(), "rejected handshakes emit nothing");

            let (mut ws, offered) = accept_without_subprotocol(&listener).await;
            assert!(!offered, "text fallback sends a plain upgrade");
            let (register, binary) = recv(&mut ws).await;
            assert!(!binary);
            assert_eq!(register.syscall, SYSCALL_REGISTER);
            wait_for(&events, &ViewerEvent::ConnectionEstablished, 1).await;
        })
        .await;
}

#[test]
fn default_options_start_binary_with_one_second_backoff() {
    let opts = TransportOptions::new("ws://localhost:8080/api/ws");
    assert_eq!(opts.negotiation, Negotiation::Binary);
    assert_eq!(opts.initial_backoff, Duration::from_secs(1));
    assert_eq!(opts.max_backoff, Duration::from_secs(10));
    assert_eq!(opts.downgrade_after, 2);
}
