//! The in-memory shape of JSON-RPC requests, responses, and notifications.
//!
//! This module only models the data (§3 of the design). Converting to and
//! from the wire's textual JSON lives in [`crate::codec`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request id: either an integer or a string. Never coerced
/// between the two on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id as i64)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A call that expects a [`Response`] carrying the same `id`.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    /// `None` means params were omitted entirely, which is distinct from
    /// `Some(Value::Null)`.
    pub params: Option<Value>,
}

/// A `Request` with no `id`; the sender expects no reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// The JSON-RPC 2.0 error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ErrorObject {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Exactly one of `result` or `error`, per the JSON-RPC 2.0 spec.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    Result(Value),
    Error(ErrorObject),
}

/// A reply to a [`Request`].
///
/// `id` is `None` only when the request could not be parsed far enough to
/// recover an id (the wire form then carries a JSON `null`).
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub id: Option<RequestId>,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Response {
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn err(id: Option<RequestId>, error: ErrorObject) -> Self {
        Response {
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }
}

/// One complete JSON-RPC message, as read off (or about to be written to)
/// the framed transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }
}
