//! End-to-end tests: the real client against an in-process WebSocket
//! server speaking the console wire protocol.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::Utc;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc};

use eventstreams_comm::auth::{Credentials, MemoryTokenStore, StoredToken, TokenStore};
use eventstreams_comm::protocol::frame;
use eventstreams_comm::{BindingSink, Client, ClientConfig, SessionEvent, Subject, Update};

const GRANT: &str = r#"{"allow":true,"token":"tok-1","permissions":[{"p":[{"d":{"id":"gates"},"p":[{"t":"gates#.*"}]}]}]}"#;
const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct Mock {
    connections: Arc<AtomicUsize>,
    drop_first_after_data: bool,
}

async fn ws_route(ws: WebSocketUpgrade, State(mock): State<Mock>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, mock))
}

/// Answers the handshake, grants any login and pushes one value per
/// subscribe, tagged with the connection number.
async fn serve(mut socket: WebSocket, mock: Mock) {
    let conn = mock.connections.fetch_add(1, Ordering::SeqCst) + 1;
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(payload) = frame::decode_frame(text.as_str()) else {
            continue;
        };
        for message in frame::split_messages(&payload) {
            let reply = if message == "H" {
                Some(format!("fLnode-{conn}"))
            } else if message.starts_with(['T', 'X']) {
                Some(format!("fA{GRANT}"))
            } else if let Some(body) = message.strip_prefix('S') {
                let alias = body.split('\u{1}').next().unwrap_or_default();
                Some(format!("fU{alias}\u{1}[{{\"conn\":{conn}}}]"))
            } else {
                None
            };
            let Some(reply) = reply else {
                continue;
            };
            let is_data = reply.starts_with("fU");
            if socket.send(Message::text(reply)).await.is_err() {
                return;
            }
            if is_data && mock.drop_first_after_data && conn == 1 {
                return;
            }
        }
    }
}

async fn start_server(drop_first_after_data: bool) -> (SocketAddr, Mock) {
    let mock = Mock {
        connections: Arc::new(AtomicUsize::new(0)),
        drop_first_after_data,
    };
    let app = Router::new()
        .route("/socket", get(ws_route))
        .with_state(mock.clone());
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, mock)
}

fn config(addr: SocketAddr) -> ClientConfig {
    let Ok(mut config) = ClientConfig::default().with_endpoint(format!("ws://{addr}/socket")) else {
        panic!("valid endpoint");
    };
    config.reconnect_interval = Duration::from_millis(50);
    config.flush_delay = Duration::from_millis(10);
    config
}

struct ChannelSink(mpsc::UnboundedSender<Update>);

impl BindingSink for ChannelSink {
    fn on_data(&self, _subject: &Subject, update: &Update) {
        let _ = self.0.send(update.clone());
    }
}

fn local_list() -> Subject {
    let Ok(subject) = Subject::local("gates", "list") else {
        panic!("valid subject");
    };
    subject
}

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;
    let Ok(Some(event)) = found else {
        panic!("expected session event did not arrive");
    };
    event
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<Update>) -> Update {
    let Ok(Some(update)) = tokio::time::timeout(WAIT, rx.recv()).await else {
        panic!("expected update did not arrive");
    };
    update
}

#[tokio::test]
async fn credential_login_then_subscribe_receives_data() {
    let (addr, _mock) = start_server(false).await;
    let store = Arc::new(MemoryTokenStore::new());
    let dyn_store: Arc<dyn TokenStore> = Arc::clone(&store) as Arc<dyn TokenStore>;
    let client = Client::connect(config(addr), dyn_store);
    let mut events = client.events();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let binding = client.bind(Arc::new(ChannelSink(tx)));
    binding.reconcile(&[local_list()]);

    let _ = wait_for(&mut events, |e| matches!(e, SessionEvent::LoginRequired { .. })).await;
    assert!(client.login(Credentials::from_password("admin", "admin")).is_ok());
    let _ = wait_for(&mut events, |e| matches!(e, SessionEvent::AccessAllowed { .. })).await;

    let update = next_update(&mut rx).await;
    assert_eq!(update.tag, 'U');
    assert_eq!(update.payload, json!([{"conn": 1}]));
    assert!(client.connected());
    assert!(client.permissions().has_topic_permission("gates", "list"));
    assert!(matches!(store.load(), Ok(Some(t)) if t.token == "tok-1"));

    binding.stop();
    assert!(client.shutdown().await.is_ok());
}

#[tokio::test]
async fn reconnect_replays_token_and_resubscribes() {
    let (addr, mock) = start_server(true).await;
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::with_token(StoredToken::new(
        "stored",
        30,
        Utc::now(),
    )));
    let client = Client::connect(config(addr), store);
    let mut events = client.events();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let binding = client.bind(Arc::new(ChannelSink(tx)));
    binding.reconcile(&[local_list()]);

    let first = next_update(&mut rx).await;
    assert_eq!(first.payload, json!([{"conn": 1}]));

    let lost = wait_for(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert!(matches!(lost, SessionEvent::Disconnected { was_open: true, .. }));

    let second = next_update(&mut rx).await;
    assert_eq!(second.payload, json!([{"conn": 2}]));
    assert_eq!(mock.connections.load(Ordering::SeqCst), 2);

    binding.stop();
    assert!(client.shutdown().await.is_ok());
}

#[tokio::test]
async fn unreachable_server_keeps_retrying() {
    let Ok(listener) = std::net::TcpListener::bind("127.0.0.1:0") else {
        panic!("bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    drop(listener);

    let client = Client::connect(config(addr), Arc::new(MemoryTokenStore::new()));
    let mut events = client.events();
    let _ = wait_for(&mut events, |e| matches!(e, SessionEvent::Connecting { attempt: 2, .. })).await;
    assert!(!client.connected());
    assert!(!client.handle().command(&local_list(), None));
    assert!(client.shutdown().await.is_ok());
}

#[tokio::test]
async fn silent_upgrade_times_out_and_retries() {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    // Accepts TCP but never answers the upgrade request.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let mut config = config(addr);
    config.connect_timeout = Duration::from_millis(200);
    let client = Client::connect(config, Arc::new(MemoryTokenStore::new()));
    let mut events = client.events();
    let started = Instant::now();

    let _ = wait_for(&mut events, |e| matches!(e, SessionEvent::Connecting { attempt: 2, .. })).await;
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(!client.connected());
    assert!(client.shutdown().await.is_ok());
}

#[tokio::test]
async fn secure_endpoint_starts_tls_handshake() {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut first = [0_u8; 1];
            if stream.read_exact(&mut first).await.is_ok() {
                let [record_type] = first;
                let _ = tx.send(record_type);
            }
        }
    });

    let Ok(config) = config(addr).with_endpoint(format!("wss://{addr}/socket")) else {
        panic!("wss endpoint is valid");
    };
    let client = Client::connect(config, Arc::new(MemoryTokenStore::new()));

    let Ok(Some(record_type)) = tokio::time::timeout(WAIT, rx.recv()).await else {
        panic!("no bytes reached the server");
    };
    // TLS handshake record
    assert_eq!(record_type, 0x16);
    assert!(!client.connected());
    assert!(client.shutdown().await.is_ok());
}
