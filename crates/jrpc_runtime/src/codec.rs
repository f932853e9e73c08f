//! Converts between [`Message`] and textual JSON per JSON-RPC 2.0 (§4.2).
//!
//! Unlike a `#[derive(Serialize, Deserialize)]` on a single tagged enum,
//! this is hand-rolled so we can preserve the distinctions the spec calls
//! out explicitly: integer vs string ids (no coercion), "params omitted"
//! vs "params = null", and the exclusivity of `result`/`error` on a
//! response. Unknown top-level fields are tolerated on parse and dropped
//! on write.

use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::message::{ErrorObject, Message, Notification, Request, RequestId, Response, ResponsePayload};

const JSONRPC_VERSION: &str = "2.0";

/// Serializes a [`Message`] to its wire JSON value.
pub fn to_value(message: &Message) -> Value {
    let mut obj = Map::new();
    obj.insert("jsonrpc".to_string(), Value::String(JSONRPC_VERSION.to_string()));

    match message {
        Message::Request(Request { id, method, params }) => {
            obj.insert("id".to_string(), id_to_value(Some(id)));
            obj.insert("method".to_string(), Value::String(method.clone()));
            if let Some(params) = params {
                obj.insert("params".to_string(), params.clone());
            }
        }
        Message::Notification(Notification { method, params }) => {
            obj.insert("method".to_string(), Value::String(method.clone()));
            if let Some(params) = params {
                obj.insert("params".to_string(), params.clone());
            }
        }
        Message::Response(Response { id, payload }) => {
            obj.insert("id".to_string(), id_to_value(id.as_ref()));
            match payload {
                ResponsePayload::Result(result) => {
                    obj.insert("result".to_string(), result.clone());
                }
                ResponsePayload::Error(error) => {
                    obj.insert("error".to_string(), serde_json::to_value(error).expect("ErrorObject always serializes"));
                }
            }
        }
    }

    Value::Object(obj)
}

/// Serializes a [`Message`] to a compact JSON string (the framed body).
pub fn to_string(message: &Message) -> Result<String, CodecError> {
    serde_json::to_string(&to_value(message)).map_err(CodecError::InvalidJson)
}

fn id_to_value(id: Option<&RequestId>) -> Value {
    match id {
        None => Value::Null,
        Some(RequestId::Number(n)) => Value::Number((*n).into()),
        Some(RequestId::String(s)) => Value::String(s.clone()),
    }
}

fn value_to_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        Value::String(s) => Some(RequestId::String(s.clone())),
        _ => None,
    }
}

/// Parses one JSON-RPC message from a JSON value already decoded from the
/// frame body.
pub fn from_value(value: Value) -> Result<Message, CodecError> {
    let Value::Object(mut obj) = value else {
        return Err(CodecError::InvalidMessage("top level value is not a JSON object".into()));
    };

    let method = obj.remove("method");
    let has_id = obj.contains_key("id");

    if let Some(method) = method {
        let Value::String(method) = method else {
            return Err(CodecError::InvalidMessage("`method` is not a string".into()));
        };
        let params = obj.remove("params");
        if has_id {
            let id_value = obj.remove("id").unwrap_or(Value::Null);
            let id = value_to_id(&id_value)
                .ok_or_else(|| CodecError::InvalidMessage("`id` is neither a number nor a string".into()))?;
            return Ok(Message::Request(Request { id, method, params }));
        }
        return Ok(Message::Notification(Notification { method, params }));
    }

    if has_id {
        let id_value = obj.remove("id").unwrap_or(Value::Null);
        let id = value_to_id(&id_value);
        let result = obj.remove("result");
        let error = obj.remove("error");
        let payload = match (result, error) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => {
                let error: ErrorObject = serde_json::from_value(error)?;
                ResponsePayload::Error(error)
            }
            (Some(_), Some(_)) => {
                return Err(CodecError::InvalidMessage(
                    "response carries both `result` and `error`".into(),
                ))
            }
            (None, None) => {
                return Err(CodecError::InvalidMessage(
                    "response carries neither `result` nor `error`".into(),
                ))
            }
        };
        return Ok(Message::Response(Response { id, payload }));
    }

    Err(CodecError::InvalidMessage(
        "message has neither `method` nor `id`/`result`/`error`".into(),
    ))
}

/// Parses one JSON-RPC message from a raw UTF-8 body.
pub fn from_str(body: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(body)?;
    from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_request_with_integer_id() {
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let encoded = to_string(&message).unwrap();
        let decoded = from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn round_trips_request_with_string_id() {
        let message = Message::request("req-1".to_string(), "echo", None);
        let encoded = to_string(&message).unwrap();
        let decoded = from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn distinguishes_omitted_params_from_null_params() {
        let omitted = Message::request(1u64, "ping", None);
        let null_params = Message::request(1u64, "ping", Some(Value::Null));

        let omitted_value = to_value(&omitted);
        let null_value = to_value(&null_params);

        assert!(omitted_value.get("params").is_none());
        assert_eq!(null_value.get("params"), Some(&Value::Null));

        assert_eq!(from_value(omitted_value).unwrap(), omitted);
        assert_eq!(from_value(null_value).unwrap(), null_params);
    }

    #[test]
    fn notification_has_no_id() {
        let message = Message::notification("ping", None);
        let value = to_value(&message);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn response_is_result_xor_error() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"ok": true},
            "error": {"code": -32600, "message": "nope"}
        });
        let err = from_value(value).unwrap_err();
        assert!(matches!(err, CodecError::InvalidMessage(_)));
    }

    #[test]
    fn response_with_null_id_is_allowed() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        });
        let message = from_value(value).unwrap();
        match message {
            Message::Response(response) => assert!(response.id.is_none()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_fields_are_tolerated() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "echo",
            "params": ["hi"],
            "traceId": "abc123"
        });
        let message = from_value(value).unwrap();
        assert_eq!(message.method(), Some("echo"));
    }
}
