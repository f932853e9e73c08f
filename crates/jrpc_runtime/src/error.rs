//! Error taxonomy (§7). Every crate-facing surface gets its own
//! `thiserror`-derived enum rather than one catch-all, mirroring the
//! `CodexError`/`McpError` split elsewhere in this workspace.

use std::time::Duration;

use thiserror::Error;

use crate::message::ErrorObject;

/// Reserved JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Errors parsing or encoding a message body (§4.2).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("body is valid JSON but not a valid JSON-RPC message: {0}")]
    InvalidMessage(String),
}

/// Errors framing messages on a byte stream (§4.1).
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("stream ended cleanly between frames")]
    EndOfStream,
    #[error("malformed frame: {0}")]
    InvalidFrame(String),
    #[error("frame body could not be decoded: {0}")]
    Decode(#[from] CodecError),
    #[error("stream ended mid-frame")]
    UnexpectedEof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors constructing a [`crate::catalog::MethodCatalog`] (§4.3).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("method `{0}` has a duplicate parameter name `{1}`")]
    DuplicateParameterName(String, String),
    #[error(
        "overload set for `{0}` cannot be disambiguated deterministically by arity or parameter names"
    )]
    AmbiguousOverload(String),
}

/// Errors raised while binding and dispatching a single request (§4.4, §4.5).
///
/// Each variant knows the JSON-RPC error code/message it maps to, so the
/// dispatch pipeline can turn any of them into a wire [`ErrorObject`]
/// without a side lookup table.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn invalid_params_for(parameter: &str, reason: impl std::fmt::Display) -> Self {
        DispatchError::InvalidParams(format!("parameter `{parameter}`: {reason}"))
    }

    /// Converts this error into the wire [`ErrorObject`], optionally
    /// carrying the offending parameter name or exception detail in `data`.
    pub fn into_error_object(self, data: Option<serde_json::Value>) -> ErrorObject {
        let (code, message) = match &self {
            DispatchError::MethodNotFound(_) => (METHOD_NOT_FOUND, "Method not found".to_string()),
            DispatchError::InvalidParams(detail) => (INVALID_PARAMS, format!("Invalid params: {detail}")),
            DispatchError::Internal(detail) => (INTERNAL_ERROR, format!("Internal error: {detail}")),
        };
        let mut error = ErrorObject::new(code, message);
        error.data = data;
        error
    }
}

/// Errors surfaced to a client invoking [`crate::client::Client::send_request`]
/// or managing the underlying transport (§4.7).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server returned JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("call was cancelled")]
    Cancelled,
    #[error("transport closed: {0}")]
    Transport(#[from] FramingError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("response channel closed unexpectedly")]
    ChannelClosed,
    #[error("declared signature does not resolve to a method descriptor")]
    NotSupported,
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<ErrorObject> for ClientError {
    fn from(err: ErrorObject) -> Self {
        ClientError::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}
