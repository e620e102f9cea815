use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RpcError};

/// JSON-RPC protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";
/// Method-name substring that marks a subscription notification.
pub const SUBSCRIPTION_MARKER: &str = "_subscription";

/// JSON-RPC request identifier.
///
/// Integer ids that fit in `i64` are always held as `Number`; `Unsigned`
/// only carries values above `i64::MAX`, so equal wire ids compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Unsigned(u64),
    String(String),
}

impl RequestId {
    /// Interpret a JSON value as an identifier. Only strings and integers
    /// in the `i64` or `u64` range qualify; fractional numbers do not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self::String(id.clone())),
            Value::Number(id) => id
                .as_i64()
                .map(Self::Number)
                .or_else(|| id.as_u64().map(Self::Unsigned)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(id) => json!(id),
            Self::Unsigned(id) => json!(id),
            Self::String(id) => json!(id),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Unsigned(id) => write!(f, "{id}"),
            Self::String(id) => write!(f, "{id:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

/// Outgoing JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Build a success response for `id`.
pub fn response_result(id: &RequestId, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.to_value(),
        "result": result,
    })
}

/// Build an error response for `id`.
pub fn response_error(id: &RequestId, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.to_value(),
        "error": { "code": code, "message": message },
    })
}

/// Build a subscription notification, e.g. `eth_subscription`.
pub fn subscription_notification(namespace: &str, subscription: &str, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": format!("{namespace}{SUBSCRIPTION_MARKER}"),
        "params": { "subscription": subscription, "result": result },
    })
}

/// Identifiers carried by an outgoing payload, in payload order.
///
/// A single request yields one identifier, a batch one per element. Any
/// element without a string or integer `id` rejects the whole payload.
pub fn request_ids(payload: &Value) -> Result<Vec<RequestId>> {
    match payload {
        Value::Object(_) => Ok(vec![required_id(payload)?]),
        Value::Array(batch) if batch.is_empty() => {
            Err(RpcError::InvalidPayload("empty batch".to_string()))
        }
        Value::Array(batch) => batch.iter().map(required_id).collect(),
        other => Err(RpcError::InvalidPayload(format!(
            "expected request object or batch, got {}",
            kind_name(other)
        ))),
    }
}

/// Identifier of a single inbound message object.
pub fn message_id(message: &Value) -> Option<RequestId> {
    message.get("id").and_then(RequestId::from_value)
}

/// Method name of a request or notification object.
pub fn method_name(message: &Value) -> Option<&str> {
    message.get("method").and_then(Value::as_str)
}

/// Returns true if the message's method contains `marker`.
pub fn has_marker(message: &Value, marker: &str) -> bool {
    method_name(message).is_some_and(|method| method.contains(marker))
}

fn required_id(request: &Value) -> Result<RequestId> {
    message_id(request).ok_or_else(|| {
        RpcError::InvalidPayload(match method_name(request) {
            Some(method) => format!("request '{method}' has no string or integer id"),
            None => "request has no string or integer id".to_string(),
        })
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_as_jsonrpc() {
        let req = Request::new("a", "eth_getBalance", json!(["0x1"]));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": "a", "method": "eth_getBalance", "params": ["0x1"]})
        );

        let bare = serde_json::to_value(Request::new(7_i64, "net_version", Value::Null)).unwrap();
        assert!(bare.get("params").is_none());
        assert_eq!(bare["id"], json!(7));
    }

    #[test]
    fn request_ids_for_single_and_batch() {
        assert_eq!(
            request_ids(&json!({"id": 1, "method": "x"})).unwrap(),
            vec![RequestId::Number(1)]
        );
        assert_eq!(
            request_ids(&json!([{"id": "a"}, {"id": 2}])).unwrap(),
            vec![RequestId::from("a"), RequestId::Number(2)]
        );
    }

    #[test]
    fn request_ids_rejects_missing_or_unusable_ids() {
        assert!(matches!(
            request_ids(&json!({"method": "x"})),
            Err(RpcError::InvalidPayload(_))
        ));
        assert!(matches!(
            request_ids(&json!([{"id": 1}, {"id": null}])),
            Err(RpcError::InvalidPayload(_))
        ));
        assert!(matches!(
            request_ids(&json!({"id": 1.5})),
            Err(RpcError::InvalidPayload(_))
        ));
        assert!(matches!(
            request_ids(&json!([])),
            Err(RpcError::InvalidPayload(_))
        ));
        assert!(matches!(
            request_ids(&json!("eth_call")),
            Err(RpcError::InvalidPayload(_))
        ));
    }

    #[test]
    fn marker_matches_substring_of_method() {
        let note = subscription_notification("eth", "0xabc", json!({"number": "0x1"}));
        assert_eq!(note["method"], json!("eth_subscription"));
        assert!(has_marker(&note, SUBSCRIPTION_MARKER));
        assert!(!has_marker(&json!({"method": "eth_call"}), SUBSCRIPTION_MARKER));
        assert!(!has_marker(&json!({"result": "0"}), SUBSCRIPTION_MARKER));
        assert!(!has_marker(&json!([note]), SUBSCRIPTION_MARKER));
    }

    #[test]
    fn response_builders_echo_the_id() {
        let id = RequestId::from("a");
        assert_eq!(
            response_result(&id, json!("0")),
            json!({"jsonrpc": "2.0", "id": "a", "result": "0"})
        );
        let err = response_error(&RequestId::Number(3), -32601, "method not found");
        assert_eq!(err["id"], json!(3));
        assert_eq!(err["error"]["code"], json!(-32601));
    }

    #[test]
    fn ids_above_i64_range_are_kept() {
        let big = json!({"id": u64::MAX, "method": "x"});
        assert_eq!(request_ids(&big).unwrap(), vec![RequestId::Unsigned(u64::MAX)]);
        assert_eq!(
            message_id(&json!({"id": u64::MAX, "result": "0"})),
            Some(RequestId::Unsigned(u64::MAX))
        );
        assert_eq!(RequestId::Unsigned(u64::MAX).to_value(), json!(u64::MAX));
        assert_eq!(RequestId::Unsigned(u64::MAX).to_string(), u64::MAX.to_string());

        // In-range values never take the unsigned form.
        assert_eq!(RequestId::from_value(&json!(5_u64)), Some(RequestId::Number(5)));
    }

    #[test]
    fn display_quotes_string_ids() {
        assert_eq!(RequestId::Number(4).to_string(), "4");
        assert_eq!(RequestId::from("a").to_string(), "\"a\"");
    }
}
