use std::{
    future::Future,
    marker::PhantomData,
    mem,
    pin::Pin,
    task::{Context, Poll},
};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::{error::ConnectionError, jsonrpc as rpc, Connection, ResponseFuture};

/// A [`Future`] that resolves to the result of a single JSON-RPC call.
pub struct RpcCall<C, R> {
    state: CallState<C>,
    _marker: PhantomData<fn() -> R>,
}

impl<C, R> RpcCall<C, R> {
    pub fn new(connection: C, params: CallParams) -> Self {
        Self { state: CallState::Prepared { connection, params }, _marker: PhantomData }
    }

    /// Converts the RPC call into its request parameters.
    ///
    /// # Panics
    ///
    /// Panics, if the call has already been polled at least once.
    pub fn to_params(self) -> CallParams {
        match self.state {
            CallState::Prepared { params, .. } => params,
            _ => panic!("rpc call future has already been polled"),
        }
    }
}

impl<C, R> RpcCall<C, R>
where
    C: Connection + ToOwned,
    C::Owned: Connection,
{
    /// Converts the call's borrowed connection handle into an owned one, so
    /// the call no longer borrows from its originating scope and can be moved
    /// to a different task.
    pub fn to_owned(self) -> RpcCall<C::Owned, R> {
        match self.state {
            CallState::Prepared { connection, params } => {
                let connection = connection.to_owned();
                RpcCall { state: CallState::Prepared { connection, params }, _marker: PhantomData }
            }
            _ => panic!("rpc call future has already been polled"),
        }
    }
}

impl<C, R> RpcCall<C, R>
where
    R: for<'de> Deserialize<'de>,
{
    fn handle_poll(
        poll: Poll<(&'static str, Result<Box<RawValue>, ConnectionError>)>,
    ) -> Poll<Result<R, ConnectionError>> {
        match poll {
            Poll::Ready((_, Ok(response))) => {
                let res = serde_json::from_str(response.get())
                    .map_err(|source| ConnectionError::json(response.get(), source));

                Poll::Ready(res)
            }
            Poll::Ready((_, Err(e))) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<C: Connection + Unpin, R: for<'de> Deserialize<'de>> Future for RpcCall<C, R> {
    type Output = Result<R, ConnectionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = Pin::new(&mut self.get_mut().state);
        let poll = state.poll(cx);
        Self::handle_poll(poll)
    }
}

/// The parameters for a JSON-RPC call.
#[derive(Clone, Debug)]
pub struct CallParams {
    pub id: u64,
    pub method: &'static str,
    pub request: Box<RawValue>,
}

impl CallParams {
    pub fn new<T: Serialize>(id: u64, method: &'static str, params: T) -> Self {
        debug_assert!(id != 0);
        let request = rpc::Request { id, method, params }.to_json();
        Self { id, method, request }
    }
}

/// The current poll state of an [`RpcCall`] future.
enum CallState<C> {
    /// All call parameters are prepared and the future has never been polled.
    Prepared { connection: C, params: CallParams },
    /// The future has been polled at least once and the initial call parameters
    /// have been consumed.
    Polled { future: ResponseFuture, method: &'static str },
    /// The future has been polled to completion.
    Completed,
}

impl<C> Future for CallState<C>
where
    C: Connection + Unpin,
{
    type Output = (&'static str, Result<Box<RawValue>, ConnectionError>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = self.get_mut();
        match state {
            Self::Prepared { connection, params } => {
                let method = params.method;
                let request = mem::replace(&mut params.request, Box::default());

                let mut future = connection.send_raw_request(params.id, request);
                match future.as_mut().poll(cx) {
                    Poll::Ready(res) => {
                        *state = Self::Completed;
                        Poll::Ready((method, res))
                    }
                    Poll::Pending => {
                        *state = Self::Polled { future, method };
                        Poll::Pending
                    }
                }
            }
            Self::Polled { future, method } => {
                let mut future = future.as_mut();
                let method = *method;

                match future.as_mut().poll(cx) {
                    Poll::Ready(res) => {
                        *state = Self::Completed;
                        Poll::Ready((method, res))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
            Self::Completed => panic!("rpc call future already completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers_core::types::U256;

    use super::*;
    use crate::noop::Noop;

    #[test]
    fn call_params_encodes_method_and_id() {
        let params = CallParams::new(7, "eth_blockNumber", ());
        assert_eq!(params.id, 7);
        assert_eq!(params.method, "eth_blockNumber");
        assert_eq!(params.request.get(), r#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":7}"#);
    }

    #[test]
    fn call_against_noop_connection_fails() {
        crate::block_on(async {
            let params = CallParams::new(1, "eth_blockNumber", ());
            let call: RpcCall<Noop, U256> = RpcCall::new(Noop, params);
            assert!(call.await.is_err());
        });
    }
}
