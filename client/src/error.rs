//! The client facade's error type: either something the underlying
//! [`Connection`](eth_rpc_core::Connection) reported, or a fault in the
//! facade's own transaction-preprocessing pipeline.

use std::fmt;

use ethers_core::types::Address;
use ethers_signers::WalletError;

use eth_rpc_core::error::ConnectionError;

/// An error that occurred while using a [`crate::Client`].
#[derive(Debug)]
pub enum ClientError {
    /// The underlying connection failed, the node replied with an error, or a
    /// raw response could not be decoded into the method's expected return type.
    Connection(ConnectionError),
    /// Local signing with a configured key failed.
    Signer(WalletError),
    /// A TX modifier aborted the send/sign pipeline.
    Modifier(Box<str>),
    /// The transaction's `from` address has no corresponding local key and
    /// `send_transaction`/`sign`/`sign_transaction` requires one.
    NoMatchingKey(Address),
    /// After defaulting and running modifiers, the transaction still has no
    /// `chain_id`, or its `chain_id` does not match the client's configured
    /// default.
    ChainIdMismatch { expected: Option<u64>, found: Option<u64> },
}

impl From<ConnectionError> for ClientError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err)
    }
}

impl From<WalletError> for ClientError {
    fn from(err: WalletError) -> Self {
        Self::Signer(err)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(err) => err.fmt(f),
            Self::Signer(err) => err.fmt(f),
            Self::Modifier(msg) => write!(f, "transaction modifier failed: {msg}"),
            Self::NoMatchingKey(addr) => write!(f, "no local key configured for address {addr:?}"),
            Self::ChainIdMismatch { expected, found } => {
                write!(f, "transaction chain_id {found:?} does not match client default {expected:?}")
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::Signer(err) => Some(err),
            _ => None,
        }
    }
}
