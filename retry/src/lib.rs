//! A policy-driven retry/backoff adapter that wraps any
//! [`Connection`]/[`DuplexConnection`] and retries its `Call` and `Subscribe`
//! operations according to a caller-supplied predicate and backoff.
//!
//! Mirrors the fee-bumping shape of `ethers-middleware`'s gas escalator (a
//! small `Fn`-like trait with a handful of concrete implementations) rather
//! than re-deriving a bespoke retry policy language.

use std::{sync::Arc, time::Duration};

use serde_json::value::RawValue;

use ethers_core::types::U256;

use eth_rpc_core::{
    error::{ConfigError, ConnectionError},
    BatchResponseFuture, Connection, DuplexConnection, ResponseFuture, SubscribeFuture,
};

/// A backoff policy: given the zero-based index of the attempt that just
/// failed, returns how long to wait before trying again.
pub trait Backoff: Send + Sync {
    fn backoff(&self, attempt: u32) -> Duration;
}

/// A constant delay on every attempt.
#[derive(Clone, Copy, Debug)]
pub struct Linear {
    delay: Duration,
}

impl Linear {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for Linear {
    fn backoff(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// `min(base * factor^attempt, max)`.
#[derive(Clone, Copy, Debug)]
pub struct Exponential {
    base: Duration,
    max: Duration,
    factor: f64,
}

impl Exponential {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self { base, max, factor }
    }
}

impl Backoff for Exponential {
    fn backoff(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        if scaled >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// A retry predicate: classifies an error observed on a failed attempt as
/// retriable (`true`) or terminal (`false`).
pub trait RetryPredicate: Send + Sync {
    fn should_retry(&self, err: &ConnectionError) -> bool;
}

/// Retries every error except the four JSON-RPC codes that indicate the
/// request itself is malformed and would fail identically on every attempt
/// (parse error, invalid request, method not found, invalid params).
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryOnAnyError;

impl RetryPredicate for RetryOnAnyError {
    fn should_retry(&self, err: &ConnectionError) -> bool {
        !matches!(err.rpc_code(), Some(-32700) | Some(-32600) | Some(-32601) | Some(-32602))
    }
}

/// Retries only node/HTTP rate-limit signals: JSON-RPC code `-32005` (limit
/// exceeded) or HTTP status `429`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryOnLimitExceeded;

impl RetryPredicate for RetryOnLimitExceeded {
    fn should_retry(&self, err: &ConnectionError) -> bool {
        err.rpc_code() == Some(-32005) || err.http_status() == Some(429)
    }
}

/// A [`Connection`] (and, when the inner type supports it,
/// [`DuplexConnection`]) that retries its `Call`/`Subscribe` operations.
///
/// `Unsubscribe` is intentionally not retried: in this crate it is purely
/// local call-table bookkeeping (see [`eth_rpc_core::SubscriptionStream`]
/// for the actual `eth_unsubscribe` RPC call, which is itself a `Call` and
/// so already covered by this adapter).
#[derive(Debug)]
pub struct RetryConnection<C, P, B> {
    connection: Arc<C>,
    predicate: Arc<P>,
    backoff: Arc<B>,
    /// `< 0` means unbounded; otherwise the maximum number of retries after
    /// the first attempt.
    max_retries: i64,
}

impl<C, P, B> RetryConnection<C, P, B> {
    /// Wraps `connection` with the given retry `predicate` and `backoff`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `max_retries == 0`: zero is rejected
    /// outright rather than silently treated as "never retry", since that is
    /// almost certainly a caller mistake (use a plain, unwrapped connection
    /// to opt out of retries entirely).
    pub fn new(connection: C, predicate: P, backoff: B, max_retries: i64) -> Result<Self, ConfigError> {
        if max_retries == 0 {
            return Err(ConfigError::new("max_retries must not be zero"));
        }

        Ok(Self {
            connection: Arc::new(connection),
            predicate: Arc::new(predicate),
            backoff: Arc::new(backoff),
            max_retries,
        })
    }
}

fn clone_raw(value: &RawValue) -> Box<RawValue> {
    RawValue::from_string(value.get().to_owned()).expect("re-serializing an already-valid JSON value")
}

impl<C, P, B> Connection for RetryConnection<C, P, B>
where
    C: Connection + 'static,
    P: RetryPredicate + 'static,
    B: Backoff + 'static,
{
    fn request_id(&self) -> u64 {
        self.connection.request_id()
    }

    fn send_raw_request(&self, id: u64, request: Box<RawValue>) -> ResponseFuture {
        let connection = self.connection.clone();
        let predicate = self.predicate.clone();
        let backoff = self.backoff.clone();
        let max_retries = self.max_retries;

        Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                let attempt_request = clone_raw(&request);
                match connection.send_raw_request(id, attempt_request).await {
                    Ok(result) => return Ok(result),
                    Err(err) if predicate.should_retry(&err) && !stop(max_retries, attempt) => {
                        tracing::debug!(attempt, %err, "retrying rpc call");
                        tokio::time::sleep(backoff.backoff(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    }

    fn send_raw_batch_request(&self, ids: Box<[u64]>, request: Box<RawValue>) -> BatchResponseFuture {
        let connection = self.connection.clone();
        let predicate = self.predicate.clone();
        let backoff = self.backoff.clone();
        let max_retries = self.max_retries;

        Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                let attempt_request = clone_raw(&request);
                match connection.send_raw_batch_request(ids.clone(), attempt_request).await {
                    Ok(result) => return Ok(result),
                    Err(eth_rpc_core::batch::BatchError::Connection(err))
                        if predicate.should_retry(&err) && !stop(max_retries, attempt) =>
                    {
                        tracing::debug!(attempt, %err, "retrying rpc batch call");
                        tokio::time::sleep(backoff.backoff(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    }
}

fn stop(max_retries: i64, attempt: u32) -> bool {
    max_retries >= 0 && attempt as i64 >= max_retries
}

impl<C, P, B> DuplexConnection for RetryConnection<C, P, B>
where
    C: DuplexConnection + 'static,
    P: RetryPredicate + 'static,
    B: Backoff + 'static,
{
    fn subscribe(&self, id: U256) -> SubscribeFuture {
        let connection = self.connection.clone();
        let predicate = self.predicate.clone();
        let backoff = self.backoff.clone();
        let max_retries = self.max_retries;

        Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                match connection.subscribe(id).await {
                    Ok(result) => return Ok(result),
                    Err(err) if predicate.should_retry(&err) && !stop(max_retries, attempt) => {
                        tracing::debug!(attempt, %err, "retrying rpc subscribe");
                        tokio::time::sleep(backoff.backoff(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    }

    fn unsubscribe(&self, id: U256) -> Result<(), ConnectionError> {
        self.connection.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use eth_rpc_core::{jsonrpc::JsonRpcError, noop::Noop};

    use super::*;

    #[test]
    fn exponential_backoff_matches_spec_sequence() {
        let backoff = Exponential::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        let observed: Vec<_> = (0..6).map(|a| backoff.backoff(a)).collect();
        assert_eq!(
            observed,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[test]
    fn linear_backoff_is_constant() {
        let backoff = Linear::new(Duration::from_millis(50));
        assert_eq!(backoff.backoff(0), backoff.backoff(10));
    }

    #[test]
    fn zero_max_retries_is_rejected() {
        let result = RetryConnection::new(Noop, RetryOnAnyError, Linear::new(Duration::ZERO), 0);
        assert!(result.is_err());
    }

    #[test]
    fn retry_on_any_error_excludes_malformed_request_codes() {
        let method_not_found = ConnectionError::jsonrpc(JsonRpcError {
            code: -32601,
            message: "method not found".into(),
            data: None,
        });
        assert!(!RetryOnAnyError.should_retry(&method_not_found));

        let internal = ConnectionError::jsonrpc(JsonRpcError {
            code: -32603,
            message: "internal error".into(),
            data: None,
        });
        assert!(RetryOnAnyError.should_retry(&internal));
    }

    #[test]
    fn retry_on_limit_exceeded_only_matches_rate_limit_signals() {
        assert!(RetryOnLimitExceeded.should_retry(&ConnectionError::jsonrpc(JsonRpcError {
            code: -32005,
            message: "limit exceeded".into(),
            data: None,
        })));
        assert!(RetryOnLimitExceeded.should_retry(&ConnectionError::http(429)));
        assert!(!RetryOnLimitExceeded.should_retry(&ConnectionError::http(500)));
        assert!(!RetryOnLimitExceeded
            .should_retry(&ConnectionError::connection("some transport fault")));
    }

    #[derive(Default)]
    struct CountingPredicate {
        retry: bool,
    }

    impl RetryPredicate for CountingPredicate {
        fn should_retry(&self, _err: &ConnectionError) -> bool {
            self.retry
        }
    }

    #[derive(Debug)]
    struct FlakyConnection {
        calls: Arc<AtomicUsize>,
        fail_first_n: usize,
    }

    impl Connection for FlakyConnection {
        fn request_id(&self) -> u64 {
            1
        }

        fn send_raw_request(&self, _id: u64, _request: Box<RawValue>) -> ResponseFuture {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail_first_n = self.fail_first_n;
            Box::pin(async move {
                if n < fail_first_n {
                    Err(ConnectionError::connection("flaky"))
                } else {
                    Ok(RawValue::from_string("true".into()).unwrap())
                }
            })
        }

        fn send_raw_batch_request(&self, _: Box<[u64]>, _: Box<RawValue>) -> BatchResponseFuture {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn succeeds_after_one_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakyConnection { calls: calls.clone(), fail_first_n: 1 };
        let retry =
            RetryConnection::new(inner, RetryOnAnyError, Linear::new(Duration::ZERO), 1).unwrap();

        let result = retry.send_raw_request(1, RawValue::from_string("null".into()).unwrap()).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakyConnection { calls, fail_first_n: 10 };
        let retry =
            RetryConnection::new(inner, RetryOnAnyError, Linear::new(Duration::ZERO), 1).unwrap();

        let result = retry.send_raw_request(1, RawValue::from_string("null".into()).unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_retry_false_stops_after_a_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakyConnection { calls: calls.clone(), fail_first_n: 10 };
        let retry = RetryConnection::new(
            inner,
            CountingPredicate { retry: false },
            Linear::new(Duration::ZERO),
            5,
        )
        .unwrap();

        let _ = retry.send_raw_request(1, RawValue::from_string("null".into()).unwrap()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
