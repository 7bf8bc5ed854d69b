//! The error taxonomy shared by every [`crate::Connection`] implementation.

use std::{error, fmt};

use crate::jsonrpc::JsonRpcError;

/// An error that occurred while exchanging requests and responses over a
/// [`crate::Connection`].
///
/// This is the core's structured error taxonomy: a substrate-level fault
/// (`Connection`), a framing/decoding fault (`Json`), or a reply the node
/// itself reported as an error (`JsonRpc`). Timeouts and cancellations are
/// represented by the dedicated [`TimeoutError`] / [`CancelledError`] types
/// rather than folded into this enum, since they are not failures *reported
/// by* a connection but conditions *observed while waiting on* one.
#[derive(Debug)]
pub enum ConnectionError {
    /// An error originating from the specific underlying transport
    /// implementation (dial failure, write/read I/O fault, a peer closing the
    /// connection, ...).
    Connection(Box<dyn error::Error + Send + Sync + 'static>),
    /// An HTTP transport received a non-2xx response.
    Http { status: u16, source: Option<Box<dyn error::Error + Send + Sync + 'static>> },
    /// The input could not be parsed as the expected JSON-RPC shape.
    Json { input: Box<str>, source: serde_json::Error },
    /// The node replied with a well-formed JSON-RPC error object.
    JsonRpc(JsonRpcError),
}

impl ConnectionError {
    pub fn connection(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Self::Connection(err.into())
    }

    pub fn http(status: u16) -> Self {
        Self::Http { status, source: None }
    }

    pub fn http_with_source(status: u16, source: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Self::Http { status, source: Some(source.into()) }
    }

    pub fn json(input: &str, source: serde_json::Error) -> Self {
        Self::Json { input: input.into(), source }
    }

    pub fn jsonrpc(err: JsonRpcError) -> Self {
        Self::JsonRpc(err)
    }

    /// The node-reported error code, if this is a [`Self::JsonRpc`] error.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::JsonRpc(err) => Some(err.code),
            _ => None,
        }
    }

    /// The HTTP status code, if this is a [`Self::Http`] error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err.as_ref()),
            Self::Http { source, .. } => source.as_deref().map(|e| e as _),
            Self::Json { source, .. } => Some(source),
            Self::JsonRpc(err) => Some(err),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(err) => err.fmt(f),
            Self::Http { status, .. } => write!(f, "HTTP request failed with status {status}"),
            Self::Json { input, .. } => write!(f, "failed to parse JSON from input ({input})"),
            Self::JsonRpc(err) => err.fmt(f),
        }
    }
}

/// A per-call timeout elapsed before the node replied.
///
/// Returned instead of a [`ConnectionError`] since a timeout is not a fault
/// reported by the connection — the call's id is deregistered from the call
/// table and no further delivery will ever occur for it.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("rpc call timed out")]
pub struct TimeoutError;

/// A call or subscribe operation was cancelled by its caller-supplied
/// cancellation token, or by the transport's owning shutdown token.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("rpc call was cancelled")]
pub struct CancelledError;

/// An invalid construction-time configuration (missing required option, zero
/// `max_retries`, an unparsable URL scheme, ...).
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub Box<str>);

impl ConfigError {
    pub fn new(msg: impl Into<Box<str>>) -> Self {
        Self(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_only_set_for_http_errors() {
        assert_eq!(ConnectionError::http(429).http_status(), Some(429));
        assert_eq!(ConnectionError::jsonrpc(JsonRpcError { code: -32601, message: "x".into(), data: None }).http_status(), None);
    }

    #[test]
    fn rpc_code_is_only_set_for_jsonrpc_errors() {
        let err = ConnectionError::jsonrpc(JsonRpcError { code: -32601, message: "not found".into(), data: None });
        assert_eq!(err.rpc_code(), Some(-32601));
        assert_eq!(ConnectionError::http(500).rpc_code(), None);
    }
}
