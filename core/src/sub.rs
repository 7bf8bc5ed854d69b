use std::{
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use serde::Deserialize;
use serde_json::value::RawValue;
use tokio_stream::Stream;

use ethers_core::types::U256;

use crate::{
    call::CallParams, error::ConnectionError, Connection, DuplexConnection, NotificationReceiver,
};

/// A stream that receives notifications for a registered subscription and
/// parses them into an expected type.
///
/// Unsubscribing is handled entirely by this type: it both sends the
/// `eth_unsubscribe` RPC call to the node and tears down the local
/// subscription table entry, so callers never have to reach back through a
/// client facade to end a subscription.
pub struct SubscriptionStream<T, C> {
    /// The ID of the subscription (`None` if no longer subscribed).
    id: Option<U256>,
    /// The connection handle (owned) required to unsubscribe.
    connection: C,
    /// The receiver for all notifications sent for the ID.
    rx: NotificationReceiver,
    /// The marker indicating the type produced by this stream.
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> SubscriptionStream<T, C> {
    /// Consumes the [`SubscriptionStream`] and returns its internal
    /// components, or `None` if the stream has previously been unsubscribed.
    pub fn into_raw(self) -> Option<(U256, NotificationReceiver)> {
        self.id.map(|id| (id, self.rx))
    }
}

impl<T, C> SubscriptionStream<T, C>
where
    C: DuplexConnection,
{
    /// Creates a new [`SubscriptionStream`] for an already-registered
    /// subscription id.
    pub fn new(id: U256, connection: C, rx: NotificationReceiver) -> Self {
        Self { id: Some(id), connection, rx, _marker: PhantomData }
    }

    /// Returns the stream's subscription ID, or `None` if it has previously
    /// been unsubscribed.
    pub fn id(&self) -> Option<&U256> {
        self.id.as_ref()
    }

    /// Ends the subscription: sends `eth_unsubscribe` to the node, then closes
    /// the local notification channel.
    ///
    /// A no-op if the stream has already been unsubscribed.
    pub async fn unsubscribe(&mut self) -> Result<(), ConnectionError> {
        let Some(id) = self.id.take() else { return Ok(()) };

        let request_id = self.connection.request_id();
        let params = CallParams::new(request_id, "eth_unsubscribe", [id]);
        let raw = self.connection.send_raw_request(params.id, params.request).await?;
        let _accepted: bool = serde_json::from_str(raw.get())
            .map_err(|source| ConnectionError::json(raw.get(), source))?;

        self.connection.unsubscribe(id)?;
        self.rx.close();
        Ok(())
    }
}

impl<T, C> SubscriptionStream<T, C>
where
    T: for<'de> Deserialize<'de>,
{
    /// Receives the next notification from the stream.
    pub async fn recv(&mut self) -> Option<Result<T, ConnectionError>> {
        let raw = self.rx.recv().await?;
        Some(Self::parse(raw))
    }

    /// Polls & parses the next notification.
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, ConnectionError>>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(raw)) => Poll::Ready(Some(Self::parse(raw))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn parse(raw: Box<RawValue>) -> Result<T, ConnectionError> {
        match serde_json::from_str(raw.get()) {
            Ok(item) => Ok(item),
            Err(source) => Err(ConnectionError::json(raw.get(), source)),
        }
    }
}

impl<T, C> Stream for SubscriptionStream<T, C>
where
    T: for<'de> Deserialize<'de>,
    C: Unpin,
{
    type Item = Result<T, ConnectionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::noop::Noop;

    #[test]
    fn into_raw_returns_id_and_receiver_before_unsubscribe() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let stream: SubscriptionStream<u64, Noop> = SubscriptionStream::new(U256::one(), Noop, rx);
        let (id, _rx) = stream.into_raw().expect("not yet unsubscribed");
        assert_eq!(id, U256::one());
    }

    #[test]
    fn id_is_cleared_after_taking_raw_parts() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut stream: SubscriptionStream<u64, Noop> =
            SubscriptionStream::new(U256::zero(), Noop, rx);
        assert_eq!(stream.id(), Some(&U256::zero()));
        let _ = stream.into_raw();
    }
}
