//! A Unix-domain IPC [`Connection`]/[`DuplexConnection`] for Ethereum-compatible
//! JSON-RPC nodes, built on [`eth_rpc_core::stream`].
//!
//! Messages are framed as concatenated JSON values on the raw byte stream
//! (matching the `json.Decoder`-style framing node implementations use for
//! their IPC endpoints), so a single `read` can yield zero, one, or several
//! complete messages, and a message can span several reads.

use std::{
    error, fmt, io,
    path::{Path, PathBuf},
};

use bytes::{Buf as _, BytesMut};
use serde_json::{value::RawValue, Deserializer};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{
        unix::{ReadHalf, WriteHalf},
        UnixStream,
    },
    sync::{mpsc, oneshot},
    task,
};
use std::sync::atomic::{AtomicU64, Ordering};

use ethers_core::types::U256;

use eth_rpc_core::{
    error::ConnectionError,
    stream::{self, Shared},
    BatchResponseFuture, Connection, DuplexConnection, ResponseFuture, SubscribeFuture,
};

/// The handle for an IPC connection to a JSON-RPC provider over a local
/// Unix-domain socket.
///
/// Dropping the last [`Ipc`] handle invalidates all requests still in
/// flight: the request channel closes, the server task exits, and the tables
/// it owned are dropped along with it.
#[derive(Debug)]
pub struct Ipc {
    next_id: AtomicU64,
    request_tx: mpsc::UnboundedSender<stream::Request>,
}

impl Ipc {
    /// Connects to the IPC socket at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| IpcError::InvalidSocket { path: path.into(), source })?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        task::spawn(run_ipc_server(stream, request_rx));

        Ok(Self { next_id: AtomicU64::new(1), request_tx })
    }
}

impl Connection for Ipc {
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

impl DuplexConnection for Ipc {
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

async fn run_ipc_server(mut stream: UnixStream, mut rx: mpsc::UnboundedReceiver<stream::Request>) {
    let (mut reader, mut writer) = stream.split();
    let mut shared = Shared::default();

    let mut buf = BytesMut::with_capacity(4096);
    let mut next: Option<Box<RawValue>> = None;

    let res = loop {
        tokio::select! {
            // writing queued requests takes priority over reading further
            // incoming messages
            biased;
            msg = rx.recv(), if next.is_none() => match msg {
                Some(request) => next = shared.handle_request(request),
                // request channel closed, the last handle was dropped
                None => break Ok(()),
            },
            res = write_next(&mut writer, &next), if next.is_some() => {
                if res.is_err() {
                    break res;
                }
                next = None;
            }
            res = read_more(&mut reader, &mut buf) => match res {
                Ok(true) => {
                    let read = match drain_messages(&mut shared, &buf) {
                        Ok(read) => read,
                        Err(e) => break Err(e),
                    };
                    buf.advance(read);
                    continue;
                }
                res => break res.map(|_| ()),
            }
        }
    };

    if let Err(e) = res {
        tracing::error!(err = ?e, "exiting IPC server due to error");
    }
}

async fn write_next(writer: &mut WriteHalf<'_>, next_request: &Option<Box<RawValue>>) -> Result<(), IpcError> {
    // only called while `next_request` is `Some`
    let buf = next_request.as_deref().unwrap().get();
    writer.write_all(buf.as_bytes()).await.map_err(Into::into)
}

async fn read_more(reader: &mut ReadHalf<'_>, buf: &mut BytesMut) -> Result<bool, IpcError> {
    let read = reader.read_buf(buf).await?;
    Ok(read != 0)
}

/// Parses and dispatches every complete JSON-RPC message in `bytes`, returning
/// the number of leading bytes that were consumed (the remainder is an
/// incomplete trailing message and stays buffered).
fn drain_messages(shared: &mut Shared, bytes: &BytesMut) -> Result<usize, IpcError> {
    let mut de = Deserializer::from_slice(bytes.as_ref()).into_iter::<&RawValue>();
    while let Some(Ok(message)) = de.next() {
        shared.handle_message(message.get());
    }
    Ok(de.byte_offset())
}

/// An error that occurred while establishing or driving an IPC connection.
#[derive(Debug)]
pub enum IpcError {
    /// The path given to [`Ipc::connect`] is not a valid Unix-domain socket.
    InvalidSocket { path: PathBuf, source: io::Error },
    /// A generic I/O error while reading from or writing to the socket.
    Io(io::Error),
    /// The server task exited and can no longer serve requests.
    ServerExit,
}

impl error::Error for IpcError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidSocket { source, .. } => Some(source),
            Self::Io(source) => Some(source),
            Self::ServerExit => None,
        }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSocket { path, .. } => write!(f, "invalid IPC socket at {path:?}"),
            Self::Io(err) => err.fmt(f),
            Self::ServerExit => f.write_str("the IPC server task has exited unexpectedly"),
        }
    }
}

impl From<io::Error> for IpcError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

fn server_exit() -> ConnectionError {
    stream::server_exit(IpcError::ServerExit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotonic() {
        let (request_tx, _rx) = mpsc::unbounded_channel();
        let ipc = Ipc { next_id: AtomicU64::new(1), request_tx };
        assert_eq!(ipc.request_id(), 1);
        assert_eq!(ipc.request_id(), 2);
    }

    #[test]
    fn drain_messages_consumes_only_complete_values() {
        let mut shared = Shared::default();
        let complete = br#"{"jsonrpc":"2.0","id":1,"result":1}"#;
        let mut bytes = BytesMut::from(&complete[..]);
        bytes.extend_from_slice(br#"{"jsonrpc":"2.0","id":2"#); // incomplete trailer

        let consumed = drain_messages(&mut shared, &bytes).unwrap();
        assert_eq!(consumed, complete.len());
    }
}
