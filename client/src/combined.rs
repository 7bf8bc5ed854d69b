//! A [`Connection`] that routes `Call` through one transport and
//! `Subscribe`/`Unsubscribe` through another.
//!
//! Some providers recommend HTTP for calls (cheap, load-balancer friendly)
//! and WebSocket for subscriptions (the only substrate that can push
//! notifications). [`Combined`] lets the URL-scheme factory hand out a single
//! [`DuplexConnection`] backed by two different underlying substrates.

use ethers_core::types::U256;
use serde_json::value::RawValue;

use eth_rpc_core::{
    BatchResponseFuture, Connection, DuplexConnection, ResponseFuture, SubscribeFuture,
};

/// Wraps a `calls` connection (used for [`Connection::send_raw_request`] /
/// [`Connection::send_raw_batch_request`]) and a `subscriptions` connection
/// (used for [`DuplexConnection::subscribe`] / [`DuplexConnection::unsubscribe`]).
///
/// Request ids come from `calls` alone: the `subscriptions` side is never
/// asked to mint its own id, since `eth_subscribe` is itself a `Call` routed
/// through `calls`.
#[derive(Debug)]
pub struct Combined<C, S> {
    calls: C,
    subscriptions: S,
}

impl<C, S> Combined<C, S> {
    pub fn new(calls: C, subscriptions: S) -> Self {
        Self { calls, subscriptions }
    }
}

impl<C, S> Connection for Combined<C, S>
where
    C: Connection,
    S: std::fmt::Debug + Send + Sync,
{
    fn request_id(&self) -> u64 {
        self.calls.request_id()
    }

    fn send_raw_request(&self, id: u64, request: Box<RawValue>) -> ResponseFuture {
        self.calls.send_raw_request(id, request)
    }

    fn send_raw_batch_request(&self, ids: Box<[u64]>, request: Box<RawValue>) -> BatchResponseFuture {
        self.calls.send_raw_batch_request(ids, request)
    }
}

impl<C, S> DuplexConnection for Combined<C, S>
where
    C: Connection,
    S: DuplexConnection,
{
    fn subscribe(&self, id: U256) -> SubscribeFuture {
        self.subscriptions.subscribe(id)
    }

    fn unsubscribe(&self, id: U256) -> Result<(), eth_rpc_core::error::ConnectionError> {
        self.subscriptions.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use eth_rpc_core::noop::Noop;

    use super::*;

    #[test]
    fn request_id_comes_from_the_calls_side() {
        let combined = Combined::new(Noop, Noop);
        assert_eq!(combined.request_id(), Noop.request_id());
    }
}
