//! A stateless HTTP [`Connection`] for Ethereum-compatible JSON-RPC nodes.
//!
//! Each call is an independent `POST` carrying no state across requests; the
//! only shared state is the request-id counter and the underlying
//! [`reqwest::Client`] connection pool. Subscriptions are not supported over
//! HTTP (see [`eth_rpc_core::DuplexConnection`] for the substrates that are).

use std::{
    future::Future,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use reqwest::{header::CONTENT_TYPE, Client};
use serde::de;
use serde_json::value::RawValue;
use url::Url;

use eth_rpc_core::{
    batch::BatchError, error::ConnectionError, jsonrpc as rpc, BatchResponseFuture, Connection,
    ResponseFuture,
};

/// An HTTP [`Connection`] to a single JSON-RPC endpoint.
#[derive(Debug)]
pub struct Http {
    next_id: AtomicU64,
    client: Client,
    url: Url,
}

impl Http {
    /// Creates a new HTTP connection over `url`, using a freshly constructed
    /// [`reqwest::Client`].
    pub fn new(url: &str) -> Result<Self, InvalidUrl> {
        let url = url.parse()?;
        Ok(Self::from_url(url))
    }

    /// Creates a new HTTP connection over `url`, reusing a caller-supplied
    /// [`reqwest::Client`] (e.g. to share a connection pool or apply custom
    /// headers/timeouts).
    pub fn with_client(url: &str, client: Client) -> Result<Self, InvalidUrl> {
        let url = url.parse()?;
        Ok(Self { next_id: AtomicU64::new(1), client, url })
    }

    fn from_url(url: Url) -> Self {
        Self { next_id: AtomicU64::new(1), client: Client::new(), url }
    }

    fn http_request(
        &self,
        request: Box<RawValue>,
    ) -> impl Future<Output = Result<reqwest::Response, reqwest::Error>> + 'static {
        self.client
            .post(self.url.as_ref())
            .header(CONTENT_TYPE, "application/json")
            .body(request.to_string())
            .send()
    }
}

impl Connection for Http {
    fn request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_raw_request(&self, _id: u64, request: Box<RawValue>) -> ResponseFuture {
        let future = self.http_request(request);
        Box::pin(async move {
            let response = future.await.map_err(ConnectionError::connection)?;

            if let Err(status_err) = response.error_for_status_ref() {
                let status = status_err.status().map(|s| s.as_u16()).unwrap_or_default();
                return Err(ConnectionError::http(status));
            }

            let text = response.text().await.map_err(ConnectionError::connection)?.into_boxed_str();

            if let Ok(rpc::Response { result, .. }) = serde_json::from_str(&text) {
                return Ok(result.to_owned());
            }

            if let Ok(rpc::Error { error, .. }) = serde_json::from_str(&text) {
                return Err(ConnectionError::jsonrpc(error));
            }

            Err(ConnectionError::json(&text, de::Error::custom("invalid HTTP response")))
        })
    }

    fn send_raw_batch_request(&self, ids: Box<[u64]>, request: Box<RawValue>) -> BatchResponseFuture {
        let future = self.http_request(request);
        Box::pin(async move {
            let response = future.await.map_err(ConnectionError::connection)?;

            if let Err(status_err) = response.error_for_status_ref() {
                let status = status_err.status().map(|s| s.as_u16()).unwrap_or_default();
                return Err(BatchError::Connection(ConnectionError::http(status)));
            }

            let text = response.text().await.map_err(ConnectionError::connection)?.into_boxed_str();

            if let Ok(mut batch) = rpc::deserialize_batch_response(&text) {
                let len = ids.len();
                if batch.len() != len {
                    return Err(BatchError::IncompleteBatch);
                }

                for i in 0..len {
                    for j in i..len {
                        if ids[i] == batch[j].id() && i != j {
                            batch.swap(i, j);
                        }
                    }
                }

                let responses = batch.into_iter().map(rpc::ResponseOrError::to_result).collect();
                return Ok(responses);
            }

            Err(ConnectionError::json(&text, de::Error::custom("invalid HTTP batch response")).into())
        })
    }
}

impl FromStr for Http {
    type Err = InvalidUrl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(s)?;
        Ok(Self::from_url(url))
    }
}

/// The error returned when an HTTP connection is constructed with an invalid URL.
pub type InvalidUrl = url::ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(Http::new("not a url").is_err());
    }

    #[test]
    fn request_ids_are_monotonic_and_unique() {
        let http = Http::new("http://localhost:8545").unwrap();
        let ids: Vec<_> = (0..5).map(|_| http.request_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
