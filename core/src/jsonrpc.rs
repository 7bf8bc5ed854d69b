//! Wire types matching the [JSON-RPC 2.0 specification](https://www.jsonrpc.org/specification)
//! as used by Ethereum-compatible nodes.

use std::{error, fmt};

use ethers_core::types::{Bytes, U256};
use serde::{
    de::{self, Unexpected},
    ser::SerializeStruct as _,
    Deserialize, Serialize,
};
use serde_json::{value::RawValue, Value};

use crate::error::ConnectionError;

/// A JSON-RPC 2.0 request.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Request<'a, T> {
    /// The unique request ID.
    pub id: u64,
    /// The name of the remote method to be called.
    pub method: &'a str,
    /// The request parameters (which must be either a list or a map).
    pub params: T,
}

impl<T: Serialize> Request<'_, T> {
    /// Serializes the request to a raw JSON value.
    ///
    /// # Panics
    ///
    /// Panics if the request can not be serialized to JSON. This should never
    /// happen for the parameter types used by this crate (they are always
    /// plain, acyclic Ethereum data), so a panic here indicates a bug in a
    /// caller-supplied parameter type's `Serialize` impl rather than a
    /// recoverable runtime condition.
    pub fn to_json(&self) -> Box<RawValue> {
        self.try_to_json().expect("failed to serialize request as JSON")
    }

    /// Attempts to serialize the request to a raw JSON value.
    pub fn try_to_json(&self) -> Result<Box<RawValue>, serde_json::Error> {
        serde_json::value::to_raw_value(self)
    }
}

impl<T: Serialize> Serialize for Request<'_, T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let has_params = std::mem::size_of::<T>() != 0;
        let len = if has_params { 4 } else { 3 };

        let mut state = serializer.serialize_struct("Request", len)?;

        state.serialize_field("jsonrpc", "2.0")?;
        state.serialize_field("method", &self.method)?;

        if has_params {
            state.serialize_field("params", &self.params)?;
        }

        state.serialize_field("id", &self.id)?;

        state.end()
    }
}

/// Either a [`Response`] or an [`Error`], used to demultiplex batch replies
/// whose element order is not guaranteed to match the request order.
#[derive(Clone, Debug)]
pub enum ResponseOrError<'a> {
    Response(Response<'a>),
    Error(Error),
}

impl ResponseOrError<'_> {
    pub fn id(&self) -> u64 {
        match self {
            Self::Response(response) => response.id,
            Self::Error(error) => error.id,
        }
    }

    pub fn to_result(self) -> Result<Box<RawValue>, ConnectionError> {
        match self {
            Self::Response(Response { result, .. }) => Ok(result.to_owned()),
            Self::Error(Error { error, .. }) => Err(ConnectionError::jsonrpc(error)),
        }
    }
}

/// Parses a batch reply (a JSON array of response/error objects).
///
/// `Deserialize` can not be derived for `ResponseOrError` as an untagged enum
/// because it borrows `RawValue`s, so each element is tried against
/// [`Response`] then [`Error`] in turn.
pub fn deserialize_batch_response(input: &str) -> Result<Vec<ResponseOrError<'_>>, serde_json::Error> {
    let raw_responses: Vec<&RawValue> = serde_json::from_str(input)?;
    let mut responses = Vec::with_capacity(raw_responses.len());

    for raw in raw_responses {
        if let Ok(response) = serde_json::from_str(raw.get()) {
            responses.push(ResponseOrError::Response(response));
            continue;
        }

        if let Ok(error) = serde_json::from_str(raw.get()) {
            responses.push(ResponseOrError::Error(error));
            continue;
        }

        return Err(de::Error::custom(format!(
            "batch element matches neither a response nor an error: {}",
            raw.get()
        )));
    }

    Ok(responses)
}

/// A JSON-RPC 2.0 success response.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct Response<'a> {
    pub id: u64,
    #[allow(unused)]
    pub jsonrpc: JsonRpc2,
    #[serde(borrow)]
    pub result: &'a RawValue,
}

/// A JSON-RPC 2.0 error response.
#[derive(Clone, Debug, Deserialize)]
pub struct Error {
    pub id: u64,
    #[allow(unused)]
    pub jsonrpc: JsonRpc2,
    pub error: JsonRpcError,
}

/// A JSON-RPC 2.0 notification (a reply with no `id`, used to carry
/// subscription payloads).
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Notification<'a> {
    #[allow(unused)]
    pub method: &'a str,
    #[allow(unused)]
    pub jsonrpc: JsonRpc2,
    #[serde(borrow)]
    pub params: Params<'a>,
}

/// A JSON-RPC 2.0 notification parameters object.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Params<'a> {
    pub subscription: U256,
    #[serde(borrow)]
    pub result: &'a RawValue,
}

/// The JSON-RPC 2.0 `"jsonrpc":"2.0"` marker, validated on deserialize.
#[derive(Clone, Copy)]
pub struct JsonRpc2;

impl fmt::Debug for JsonRpc2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("2.0")
    }
}

impl fmt::Display for JsonRpc2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpc2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Deserialize::deserialize(deserializer)? {
            "2.0" => Ok(JsonRpc2),
            inv => Err(de::Error::invalid_value(Unexpected::Str(inv), &"2.0")),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    /// The error code.
    pub code: i64,
    /// The error message.
    pub message: String,
    /// The optional additional error context data.
    ///
    /// Promoted from a `0x`-prefixed hex string to raw bytes by
    /// [`JsonRpcError::data_bytes`]; any other shape (object, number, ...) is
    /// retained verbatim in [`Self::data`].
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Returns [`Self::data`] decoded as raw bytes if it is a `0x`-prefixed
    /// hex string, `None` otherwise.
    pub fn data_bytes(&self) -> Option<Bytes> {
        let hex = self.data.as_ref()?.as_str()?;
        hex.parse().ok()
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (msg, code) = (self.message.as_str(), self.code);
        match &self.data {
            Some(data) => write!(f, "{msg} (code={code},data={data})"),
            None => write!(f, "{msg} (code={code})"),
        }
    }
}

impl error::Error for JsonRpcError {}

/// The two node-observed shapes of an `eth_signTransaction` reply: either a
/// bare hex string (the raw signed transaction), or an object carrying both
/// the raw bytes and the decoded transaction.
///
/// Distinguished by peeking at the first non-whitespace byte of the raw JSON
/// value: `"` starts the bare-string form, `{` starts the object form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignTransactionReply {
    /// The raw RLP-encoded signed transaction.
    pub raw: Bytes,
}

impl<'de> Deserialize<'de> for SignTransactionReply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Bare(Bytes),
            Object {
                raw: Bytes,
                #[allow(unused)]
                #[serde(default)]
                tx: Option<Value>,
            },
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::Bare(raw) => Self { raw },
            Shape::Object { raw, .. } => Self { raw },
        })
    }
}

#[cfg(test)]
mod tests {
    use ethers_core::types::Address;

    use super::{Request, SignTransactionReply};

    #[test]
    fn serialize_request() {
        let request = Request { id: 1, method: "eth_getBalance", params: [Address::zero()] };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r###"{"jsonrpc":"2.0","method":"eth_getBalance","params":["0x0000000000000000000000000000000000000000"],"id":1}"###
        )
    }

    #[test]
    fn sign_transaction_reply_accepts_bare_string() {
        let reply: SignTransactionReply = serde_json::from_str(r#""0x1234""#).unwrap();
        assert_eq!(reply.raw, ethers_core::types::Bytes::from(vec![0x12, 0x34]));
    }

    #[test]
    fn sign_transaction_reply_accepts_object() {
        let reply: SignTransactionReply =
            serde_json::from_str(r#"{"raw":"0x1234","tx":{"nonce":"0x0"}}"#).unwrap();
        assert_eq!(reply.raw, ethers_core::types::Bytes::from(vec![0x12, 0x34]));
    }

    #[test]
    fn both_variants_agree_on_raw() {
        let bare: SignTransactionReply = serde_json::from_str(r#""0xdeadbeef""#).unwrap();
        let obj: SignTransactionReply =
            serde_json::from_str(r#"{"raw":"0xdeadbeef","tx":{}}"#).unwrap();
        assert_eq!(bare.raw, obj.raw);
    }

    #[test]
    fn jsonrpc_error_decodes_hex_data() {
        let err: super::JsonRpcError =
            serde_json::from_str(r#"{"code":-32000,"message":"execution reverted","data":"0xdeadbeef"}"#)
                .unwrap();
        assert_eq!(
            err.data_bytes().unwrap(),
            ethers_core::types::Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn jsonrpc_error_keeps_non_hex_data_verbatim() {
        let err: super::JsonRpcError =
            serde_json::from_str(r#"{"code":-32000,"message":"oops","data":{"reason":"bad"}}"#)
                .unwrap();
        assert!(err.data_bytes().is_none());
        assert!(err.data.is_some());
    }
}
