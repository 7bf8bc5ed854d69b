//! The server-task scaffolding shared by every persistent, bidirectional
//! transport (WebSocket and IPC).
//!
//! Both substrates multiplex an arbitrary number of concurrent calls,
//! batches, and subscriptions over a single duplex byte stream. Rather than
//! guard a shared call/subscription table behind a lock, each transport owns
//! exactly one background task holding this state exclusively; callers talk
//! to it over an `mpsc` channel of [`Request`] messages, and the task itself
//! decides, via [`Shared::handle_request`] and [`Shared::handle_message`],
//! what bytes (if any) need to go out and what needs to be delivered back.
//!
//! A transport only has to supply the actual I/O: how a `Request`'s payload
//! bytes are written out, and how incoming bytes are sliced into individual
//! JSON-RPC messages before being handed to [`Shared::handle_message`].

use std::{collections::hash_map::Entry, hash::BuildHasherDefault, mem};

use hashers::fx_hash::FxHasher64;
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};

use ethers_core::types::U256;

use crate::{
    batch::BatchError, error::ConnectionError, jsonrpc as rpc, BatchResponsePayload,
    NotificationReceiver, ResponsePayload, ResponseSender,
};

/// A `HashMap` keyed by request/subscription id, hashed with the
/// non-cryptographic [`FxHasher64`] (ids are attacker-uncontrolled locally
/// generated counters, so collision resistance is not a concern).
pub type FxHashMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher64>>;

/// A registered subscription: the sender half notifications are pushed
/// through, and the receiver half for a not-yet-claimed subscription (`None`
/// once [`Shared::handle_request`] has handed it to a caller).
pub type Subscription = (mpsc::UnboundedSender<Box<RawValue>>, Option<NotificationReceiver>);

/// A request sent from a [`crate::Connection`]/[`crate::DuplexConnection`]
/// handle to its owning server task.
pub enum Request {
    Call { id: u64, tx: ResponseSender, request: Box<RawValue> },
    BatchCall { ids: Box<[u64]>, tx: oneshot::Sender<BatchResponsePayload>, request: Box<RawValue> },
    Subscribe { id: U256, tx: oneshot::Sender<Option<NotificationReceiver>> },
    Unsubscribe { id: U256 },
}

/// The bookkeeping for a batch call still awaiting all of its responses.
pub struct PendingBatchCall {
    pub ids: Box<[u64]>,
    pub tx: oneshot::Sender<BatchResponsePayload>,
}

/// The state owned exclusively by a persistent transport's server task.
pub struct Shared {
    /// The map of pending single-call requests.
    pending: FxHashMap<u64, ResponseSender>,
    /// The set of pending batch requests, keyed by their sorted id list.
    pending_batches: FxHashMap<Box<[u64]>, PendingBatchCall>,
    /// The map of registered subscriptions.
    subs: FxHashMap<U256, Subscription>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            pending: FxHashMap::with_capacity_and_hasher(64, Default::default()),
            pending_batches: FxHashMap::with_capacity_and_hasher(64, Default::default()),
            subs: FxHashMap::with_capacity_and_hasher(64, Default::default()),
        }
    }
}

impl Shared {
    /// Handles an incoming [`Request`] from a connection handle.
    ///
    /// Returns the raw bytes that need to be written to the wire, if any.
    pub fn handle_request(&mut self, request: Request) -> Option<Box<RawValue>> {
        match request {
            Request::Call { id, tx, request } => {
                let prev = self.pending.insert(id, tx);
                assert!(prev.is_none(), "replaced pending request (id={id})");
                Some(request)
            }
            Request::BatchCall { ids, tx, request } => {
                // the sorted id list is used as key so presence/completeness
                // of a batch reply can be checked in a single step
                let mut ids_sorted = ids.clone();
                ids_sorted.sort_unstable();

                let prev = self.pending_batches.insert(ids_sorted, PendingBatchCall { ids, tx });
                if let Some(prev) = prev {
                    panic!("replaced pending batch request (ids={:?})", prev.ids);
                }

                Some(request)
            }
            Request::Subscribe { id, tx } => {
                let res = match self.subs.entry(id) {
                    // the entry already exists, e.g., because a notification
                    // for this id arrived before the subscribe call did
                    Entry::Occupied(mut occ) => {
                        let (_, rx) = occ.get_mut();
                        rx.take()
                    }
                    Entry::Vacant(vac) => {
                        let (sub_tx, sub_rx) = mpsc::unbounded_channel();
                        vac.insert((sub_tx, None));
                        Some(sub_rx)
                    }
                };

                let _ = tx.send(res);
                None
            }
            Request::Unsubscribe { id } => {
                // dropping the sender half ends the subscription stream; if
                // the node has not separately been told to stop sending
                // notifications, the entry will simply be re-created
                let _ = self.subs.remove(&id);
                None
            }
        }
    }

    /// Parses and dispatches a single complete JSON-RPC message received over
    /// the wire: a response, an error, a notification, or a batch reply.
    pub fn handle_message(&mut self, message: &str) {
        if let Ok(rpc::Response { id, result, .. }) = serde_json::from_str(message) {
            self.handle_response(id, Ok(result.to_owned()));
            return;
        }

        if let Ok(rpc::Notification { params, .. }) = serde_json::from_str(message) {
            self.handle_notification(params);
            return;
        }

        if let Ok(batch) = rpc::deserialize_batch_response(message) {
            self.handle_batch(batch);
            return;
        }

        if let Ok(rpc::Error { id, error, .. }) = serde_json::from_str(message) {
            self.handle_response(id, Err(ConnectionError::jsonrpc(error)));
            return;
        }

        tracing::error!(%message, "received message that matches no expected JSON-RPC shape");
    }

    fn handle_response(&mut self, id: u64, res: ResponsePayload) {
        match self.pending.remove(&id) {
            Some(tx) => {
                // if send fails, the call future has been dropped at the callsite
                let _ = tx.send(res);
            }
            None => tracing::warn!(%id, "no pending request exists for response id"),
        }
    }

    fn handle_notification(&mut self, params: rpc::Params<'_>) {
        let notification = params.result.to_owned();

        let ok = match self.subs.entry(params.subscription) {
            Entry::Occupied(occ) => {
                let (tx, _) = occ.get();
                tx.send(notification).is_ok()
            }
            // push the first notification for a not-yet-registered
            // subscription so none get lost between `eth_subscribe`
            // returning and the stream's local table entry being created
            Entry::Vacant(vac) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let (tx, _) = vac.insert((tx, Some(rx)));
                tx.send(notification).is_ok()
            }
        };

        if !ok {
            // the channel was dropped without unsubscribing
            let _ = self.subs.remove(&params.subscription);
        }
    }

    fn handle_batch(&mut self, mut batch: Vec<rpc::ResponseOrError<'_>>) {
        let mut ids_sorted = batch.iter().map(|response| response.id()).collect::<Box<[_]>>();
        ids_sorted.sort_unstable();

        if let Some(PendingBatchCall { ids, tx }) = self.pending_batches.remove(&*ids_sorted) {
            // every id in `ids` is present in `batch`, but not necessarily at
            // the same index; reorder in place to match the caller's order
            debug_assert_eq!(batch.len(), ids.len());
            let len = ids.len();
            for i in 0..len {
                for j in i..len {
                    if ids[i] == batch[j].id() && i != j {
                        batch.swap(i, j);
                    }
                }
            }

            let responses = batch.into_iter().map(rpc::ResponseOrError::to_result).collect();
            let _ = tx.send(Ok(responses));
            return;
        }

        // no batch exists for the exact set of received ids; invalidate any
        // batch that is a superset of what we received, since it can no
        // longer be completed
        self.pending_batches.retain(|key, pending| {
            if ids_sorted.iter().any(|id| key.contains(id)) {
                let (tx, _) = oneshot::channel();
                let _ = mem::replace(&mut pending.tx, tx).send(Err(BatchError::IncompleteBatch));
                false
            } else {
                true
            }
        });
    }
}

/// Wraps a transport-exit condition in a [`ConnectionError`], for use when a
/// transport's server task has already terminated and a caller's `mpsc` send
/// or `oneshot::Receiver::await` therefore fails.
pub fn server_exit(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> ConnectionError {
    ConnectionError::connection(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_notification_then_subscribe_delivers_first_notification() {
        let mut shared = Shared::default();
        let id = U256::from(7);

        // a notification for `id` arrives before the subscriber registers
        shared.handle_message(
            &format!(r#"{{"jsonrpc":"2.0","method":"eth_subscription","params":{{"subscription":"{id:#x}","result":1}}}}"#),
        );

        let (tx, rx) = oneshot::channel();
        shared.handle_request(Request::Subscribe { id, tx });
        let mut rx = rx.try_recv().unwrap().expect("subscription channel");

        assert_eq!(rx.try_recv().unwrap().get(), "1");
    }

    #[test]
    fn unmatched_batch_response_is_dropped() {
        let mut shared = Shared::default();
        // no pending batch was registered, so this must not panic
        shared.handle_message(
            r#"[{"jsonrpc":"2.0","id":1,"result":1},{"jsonrpc":"2.0","id":2,"result":2}]"#,
        );
    }

    #[test]
    fn response_with_no_pending_call_is_dropped_not_panicking() {
        let mut shared = Shared::default();
        shared.handle_message(r#"{"jsonrpc":"2.0","id":99,"result":1}"#);
    }
}
