//! A WebSocket [`Connection`]/[`DuplexConnection`] for Ethereum-compatible
//! JSON-RPC nodes, built on [`eth_rpc_core::stream`].
//!
//! Dialing spawns a single background task that owns the WS stream and the
//! [`Shared`](eth_rpc_core::stream::Shared) call/subscription tables; the
//! [`WebSocket`] handle only ever talks to that task over an `mpsc` channel.

use std::{
    error, fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use serde_json::value::RawValue;
use tokio::{
    sync::{mpsc, oneshot},
    task,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream};

use ethers_core::types::U256;

use eth_rpc_core::{
    error::ConnectionError,
    stream::{self, Shared},
    BatchResponseFuture, Connection, DuplexConnection, ResponseFuture, SubscribeFuture,
};

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// The handle for an established WebSocket connection to a JSON-RPC provider.
///
/// Dropping the last [`WebSocket`] handle closes the request channel, which
/// causes the background server task to exit and drop both tables.
#[derive(Debug)]
pub struct WebSocket {
    next_id: AtomicU64,
    request_tx: mpsc::UnboundedSender<stream::Request>,
}

impl WebSocket {
    /// Dials `url` and spawns the server task driving the connection.
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (request_tx, request_rx) = mpsc::unbounded_channel();

        task::spawn(run_ws_server(stream, request_rx));

        Ok(Self { next_id: AtomicU64::new(1), request_tx })
    }

    /// Returns `true` if the connection's server task is still running.
    pub fn ready(&self) -> bool {
        !self.request_tx.is_closed()
    }
}

impl Connection for WebSocket {
    fn request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_raw_request(&self, id: u64, request: Box<RawValue>) -> ResponseFuture {
        let (tx, rx) = oneshot::channel();
        let res = self.request_tx.send(stream::Request::Call { id, tx, request });

        Box::pin(async move {
            res.map_err(|_| server_exit())?;
            rx.await.map_err(|_| server_exit())?
        })
    }

    fn send_raw_batch_request(&self, ids: Box<[u64]>, request: Box<RawValue>) -> BatchResponseFuture {
        let (tx, rx) = oneshot::channel();
        let res = self.request_tx.send(stream::Request::BatchCall { ids, tx, request });

        Box::pin(async move {
            res.map_err(|_| server_exit())?;
            rx.await.map_err(|_| server_exit())?
        })
    }
}

impl DuplexConnection for WebSocket {
    fn subscribe(&self, id: U256) -> SubscribeFuture {
        let (tx, rx) = oneshot::channel();
        let res = self.request_tx.send(stream::Request::Subscribe { id, tx });

        Box::pin(async move {
            res.map_err(|_| server_exit())?;
            Ok(rx.await.map_err(|_| server_exit())?)
        })
    }

    fn unsubscribe(&self, id: U256) -> Result<(), ConnectionError> {
        self.request_tx.send(stream::Request::Unsubscribe { id }).map_err(|_| server_exit())
    }
}

async fn run_ws_server(mut ws: WsStream, mut rx: mpsc::UnboundedReceiver<stream::Request>) {
    let mut shared = Shared::default();

    let res = loop {
        tokio::select! {
            biased;
            request = rx.recv() => match request {
                Some(request) => {
                    if let Some(payload) = shared.handle_request(request) {
                        if let Err(e) = ws.send(Message::Text(payload.to_string())).await {
                            break Err(e.into());
                        }
                    }
                }
                // request channel closed: the last handle was dropped
                None => break Ok(()),
            },
            msg = ws.next() => match msg {
                Some(Ok(msg)) => match handle_message(&mut ws, &mut shared, msg).await {
                    Ok(should_close) if should_close => break Ok(()),
                    Ok(_) => {}
                    Err(e) => break Err(e),
                },
                // read errors other than a clean peer close do not terminate
                // the transport; the loop keeps serving already-pending work
                // and future requests, leaving detection of a stuck
                // connection to the application (e.g. a stalled subscription)
                Some(Err(e)) => tracing::warn!(err = %e, "ignoring WS read error"),
                None => break Ok(()),
            },
        }
    };

    if let Err(e) = res {
        tracing::error!(err = ?e, "exiting WS server due to error");
    }
}

async fn handle_message(ws: &mut WsStream, shared: &mut Shared, msg: Message) -> Result<bool, WsError> {
    match msg {
        Message::Text(text) => {
            shared.handle_message(&text);
            Ok(false)
        }
        // answer pings transparently; never surfaced to the application
        Message::Ping(payload) => {
            ws.send(Message::Pong(payload)).await?;
            Ok(false)
        }
        Message::Close(_) => Ok(true),
        Message::Frame(_) | Message::Binary(_) | Message::Pong(_) => Ok(false),
    }
}

/// An error that occurred while establishing or driving a WebSocket connection.
#[derive(Debug)]
pub enum WsError {
    /// The underlying WebSocket connection faulted.
    Websocket(tokio_tungstenite::tungstenite::Error),
    /// The server task exited and can no longer serve requests.
    ServerExit,
}

impl error::Error for WsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Websocket(e) => Some(e),
            Self::ServerExit => None,
        }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Websocket(e) => e.fmt(f),
            Self::ServerExit => f.write_str("the WebSocket server task has exited unexpectedly"),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Websocket(err)
    }
}

fn server_exit() -> ConnectionError {
    stream::server_exit(WsError::ServerExit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_reflects_open_request_channel() {
        let (request_tx, _request_rx) = mpsc::unbounded_channel();
        let ws = WebSocket { next_id: AtomicU64::new(1), request_tx };
        assert!(ws.ready());
    }

    #[test]
    fn request_ids_are_monotonic() {
        let (request_tx, _request_rx) = mpsc::unbounded_channel();
        let ws = WebSocket { next_id: AtomicU64::new(1), request_tx };
        assert_eq!(ws.request_id(), 1);
        assert_eq!(ws.request_id(), 2);
    }
}
