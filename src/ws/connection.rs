//! Transport driver.
//!
//! Owns the one live socket and the [`Session`]. Each cycle dials the
//! endpoint with a connect timeout, runs the read/write loop while open,
//! then waits out the reconnect delay. Facade requests are served in every
//! phase so that `Shutdown` is honoured promptly.

use std::future;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::state::Link;
use crate::config::ClientConfig;
use crate::error::CommError;
use crate::session::{Request, Session};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Whether the driver keeps cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Reconnect,
    Shutdown,
}

/// Runs the reconnect loop until a [`Request::Shutdown`] arrives or every
/// request sender is dropped.
pub async fn run_driver(
    config: ClientConfig,
    mut session: Session,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let mut link = Link::new();

    while let Some(attempt) = link.begin_attempt() {
        session.on_connecting(attempt);
        tracing::info!(endpoint = %config.endpoint, attempt, "connecting");

        let dialed = tokio::select! {
            res = dial(&config) => res,
            () = serve_requests(&mut requests, &mut session) => {
                link.force_close();
                let _ = link.closed();
                session.on_disconnected(false);
                break;
            }
        };

        let flow = match dialed {
            Ok(socket) => {
                link.opened();
                tracing::info!(endpoint = %config.endpoint, "connection open");
                session.on_connected();
                run_open(socket, &mut requests, &mut session).await
            }
            Err(err) => {
                tracing::warn!(error = %err, code = err.error_code(), "connection attempt failed");
                Flow::Reconnect
            }
        };

        if flow == Flow::Shutdown {
            link.force_close();
        }
        let was_open = link.closed();
        if was_open {
            tracing::warn!("connection lost");
        }
        session.on_disconnected(was_open);
        if link.is_force_closed() {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(config.reconnect_interval) => {}
            () = serve_requests(&mut requests, &mut session) => {
                link.force_close();
            }
        }
    }

    tracing::info!("transport driver stopped");
}

async fn dial(config: &ClientConfig) -> Result<Socket, CommError> {
    match tokio::time::timeout(config.connect_timeout, connect_async(config.endpoint.as_str())).await
    {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(CommError::ConnectTimeout {
            timeout_ms: u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Applies requests while no socket is open. Resolves on shutdown.
async fn serve_requests(requests: &mut mpsc::UnboundedReceiver<Request>, session: &mut Session) {
    loop {
        match requests.recv().await {
            Some(Request::Shutdown) | None => return,
            Some(request) => session.apply(request, Instant::now()),
        }
    }
}

/// Read/write loop for an open socket.
async fn run_open(
    socket: Socket,
    requests: &mut mpsc::UnboundedReceiver<Request>,
    session: &mut Session,
) -> Flow {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        while let Some(frame) = session.poll_transmit() {
            tracing::debug!(len = frame.len(), "sending frame");
            if let Err(err) = ws_tx.send(Message::text(frame)).await {
                tracing::warn!(error = %err, "send failed");
                return Flow::Reconnect;
            }
        }
        if session.take_reconnect_request() {
            tracing::info!("recycling connection after logout");
            let _ = ws_tx.send(Message::Close(None)).await;
            return Flow::Reconnect;
        }

        let deadline = session.poll_timeout();
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => session.on_frame(text.as_str(), Instant::now()),
                    Some(Ok(Message::Close(_))) | None => return Flow::Reconnect,
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "socket error");
                        return Flow::Reconnect;
                    }
                    _ => {}
                }
            }
            req = requests.recv() => {
                match req {
                    Some(Request::Shutdown) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return Flow::Shutdown;
                    }
                    Some(request) => session.apply(request, Instant::now()),
                }
            }
            () = sleep_until(deadline) => session.handle_timeout(Instant::now()),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => future::pending().await,
    }
}
