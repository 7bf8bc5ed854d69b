//! Transport-agnostic JSON-RPC 2.0 multiplexer for Ethereum-compatible nodes.
//!
//! This crate defines the [`Connection`] / [`DuplexConnection`] traits that every
//! wire substrate (HTTP, WebSocket, IPC) implements, the [`RpcCall`] future that
//! drives a single request/response exchange, [`SubscriptionStream`] for
//! long-lived notification streams, and the shared [`stream`] server scaffolding
//! used by the two persistent substrates.

pub mod batch;
pub mod error;
pub mod jsonrpc;
pub mod noop;
pub mod stream;

mod call;
mod sub;

use std::{future::Future, ops::Deref, pin::Pin};

use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};

use ethers_core::types::U256;

pub use crate::{
    batch::{BatchCall, BatchError},
    call::{CallParams, RpcCall},
    error::ConnectionError,
    sub::SubscriptionStream,
};

#[cfg(target_arch = "wasm32")]
type DynFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;
#[cfg(not(target_arch = "wasm32"))]
type DynFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The payload of a response received over a [`Connection`].
pub type ResponsePayload = Result<Box<RawValue>, ConnectionError>;
/// The payload of a batch response received over a [`Connection`].
pub type BatchResponsePayload = Result<Vec<Result<Box<RawValue>, ConnectionError>>, BatchError>;

/// The sender half of a single-shot [`ResponsePayload`] delivery channel.
pub type ResponseSender = oneshot::Sender<ResponsePayload>;

/// The [`Future`] resolving to a [`Connection`]'s response to a request.
pub type ResponseFuture = DynFuture<'static, ResponsePayload>;
/// The [`Future`] resolving to a [`Connection`]'s response to a batch request.
pub type BatchResponseFuture = DynFuture<'static, BatchResponsePayload>;

/// A connection allowing the exchange of JSON-RPC messages between a local
/// client and a remote Ethereum-compatible node.
///
/// Implementors own a request-id counter and whatever substrate carries bytes
/// to the node (an HTTP client, or the writer half of a persistent stream).
/// They know nothing about Ethereum method names or parameter shapes — that is
/// the client facade's concern, layered on top of this trait.
pub trait Connection: std::fmt::Debug + Send + Sync {
    /// Returns a unique request ID, monotonically increasing from `1` for the
    /// lifetime of this connection.
    fn request_id(&self) -> u64;

    /// Sends a JSON-RPC request to the connected API provider and returns its
    /// response.
    ///
    /// The caller has to ensure that `id` is identical to the id encoded in
    /// `request` and that the latter represents a valid JSON-RPC 2.0 request.
    fn send_raw_request(&self, id: u64, request: Box<RawValue>) -> ResponseFuture;

    /// Sends a JSON-RPC batch request to the connected API provider and returns
    /// its response.
    ///
    /// The caller has to ensure that for each ID in `ids` there is a
    /// corresponding valid JSON object in `request`, which must be formatted
    /// as an array.
    ///
    /// The implementation has to ensure that the order of returned responses
    /// matches the order of the given `ids`, regardless of the order the node
    /// replied in.
    fn send_raw_batch_request(
        &self,
        ids: Box<[u64]>,
        request: Box<RawValue>,
    ) -> BatchResponseFuture;
}

// blanket impl for all types derefencing to a `Connection`
impl<C, D> Connection for D
where
    C: Connection + ?Sized,
    D: Deref<Target = C> + std::fmt::Debug + Send + Sync,
{
    fn request_id(&self) -> u64 {
        self.deref().request_id()
    }

    fn send_raw_request(&self, id: u64, request: Box<RawValue>) -> ResponseFuture {
        self.deref().send_raw_request(id, request)
    }

    fn send_raw_batch_request(
        &self,
        ids: Box<[u64]>,
        request: Box<RawValue>,
    ) -> BatchResponseFuture {
        self.deref().send_raw_batch_request(ids, request)
    }
}

/// The future returned by [`DuplexConnection::subscribe`] that resolves to the
/// channel receiver for all notifications received for a subscription id.
pub type SubscribeFuture = DynFuture<'static, SubscribePayload>;

/// The payload of a response to a subscribe request.
pub type SubscribePayload = Result<Option<NotificationReceiver>, ConnectionError>;

/// The receiver channel half for subscription notifications.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Box<RawValue>>;

/// A [`Connection`] that allows publish/subscribe communication with the API
/// provider (WebSocket and IPC; HTTP does not implement this trait).
pub trait DuplexConnection: Connection {
    /// Registers interest in all notifications for the given `id` and returns
    /// a [`NotificationReceiver`] for them.
    ///
    /// This only creates the local table entry and channel. A separate RPC
    /// call to `eth_subscribe` is what causes the node to actually start
    /// sending notifications for this id. If the id is already subscribed to,
    /// `None` is returned.
    fn subscribe(&self, id: U256) -> SubscribeFuture;

    /// Removes the local table entry for `id`, closing its notification
    /// channel.
    ///
    /// A separate RPC call to `eth_unsubscribe` is needed to stop the node
    /// from sending further notifications for this id.
    fn unsubscribe(&self, id: U256) -> Result<(), ConnectionError>;
}

// blanket impl for all types derefencing to a `DuplexConnection`
impl<C, D> DuplexConnection for D
where
    C: DuplexConnection + ?Sized,
    D: Deref<Target = C> + std::fmt::Debug + Send + Sync,
{
    fn subscribe(&self, id: U256) -> SubscribeFuture {
        self.deref().subscribe(id)
    }

    fn unsubscribe(&self, id: U256) -> Result<(), ConnectionError> {
        self.deref().unsubscribe(id)
    }
}

#[cfg(test)]
pub(crate) fn block_on(future: impl Future<Output = ()>) {
    use tokio::runtime::Builder;
    Builder::new_current_thread().enable_all().build().unwrap().block_on(future);
}
