//! A [`Connection`]/[`DuplexConnection`] test double that always fails.

use serde_json::value::RawValue;

use ethers_core::types::U256;

use crate::{
    error::ConnectionError, BatchResponseFuture, Connection, DuplexConnection, ResponseFuture,
    SubscribeFuture,
};

/// A connection that does nothing and always fails immediately.
///
/// Useful as a placeholder `C` type parameter in doctests and unit tests that
/// exercise code paths not actually depending on a live connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Noop;

impl Connection for Noop {
    fn request_id(&self) -> u64 {
        1
    }

    fn send_raw_request(&self, _id: u64, request: Box<RawValue>) -> ResponseFuture {
        Box::pin(async move {
            Err(ConnectionError::connection(format!(
                "noop connection requests always fail (request={request})"
            )))
        })
    }

    fn send_raw_batch_request(&self, _ids: Box<[u64]>, request: Box<RawValue>) -> BatchResponseFuture {
        Box::pin(async move {
            Err(ConnectionError::connection(format!(
                "noop connection requests always fail (request={request})"
            ))
            .into())
        })
    }
}

impl DuplexConnection for Noop {
    fn subscribe(&self, id: U256) -> SubscribeFuture {
        Box::pin(async move {
            Err(ConnectionError::connection(format!(
                "noop connection requests always fail (sub_id={id})"
            )))
        })
    }

    fn unsubscribe(&self, id: U256) -> Result<(), ConnectionError> {
        Err(ConnectionError::connection(format!("noop connection requests always fail (sub_id={id})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_request_always_errors() {
        crate::block_on(async {
            let result = Noop.send_raw_request(1, RawValue::from_string("null".into()).unwrap()).await;
            assert!(result.is_err());
        });
    }

    #[test]
    fn noop_request_ids_are_constant() {
        assert_eq!(Noop.request_id(), Noop.request_id());
    }
}
