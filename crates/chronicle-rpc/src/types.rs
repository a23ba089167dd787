//! RPC wire-format types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcError;

/// Request identifier; clients may send a string or a number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// Incoming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Echoed back on the response.
    pub id: RequestId,
    /// Method name (e.g. `context.getSnapshot`).
    pub method: String,
    /// Parameters object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: RequestId,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error inside an [`RpcResponse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable code (e.g. `SESSION_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Session id, token counts, and similar context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcResponse {
    /// Success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failure response carrying `err`.
    pub fn failure(id: RequestId, err: &RpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(err.to_error_body()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_string_and_numeric_ids() {
        let a: RpcRequest =
            serde_json::from_value(json!({"id": "r1", "method": "context.getSnapshot"})).unwrap();
        assert_eq!(a.id, RequestId::String("r1".into()));
        assert!(a.params.is_none());

        let b: RpcRequest = serde_json::from_value(
            json!({"id": 7, "method": "context.clear", "params": {"sessionId": "s"}}),
        )
        .unwrap();
        assert_eq!(b.id, RequestId::Number(7));
        assert_eq!(b.params.unwrap()["sessionId"], "s");
    }

    #[test]
    fn success_omits_error() {
        let resp = RpcResponse::success(RequestId::Number(1), json!({"ok": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({"id": 1, "success": true, "result": {"ok": true}}));
    }

    #[test]
    fn failure_omits_result() {
        let err = RpcError::InvalidParams {
            message: "Missing required parameter: sessionId".into(),
        };
        let resp = RpcResponse::failure("r2".into(), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], "r2");
        assert_eq!(json["success"], false);
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], "INVALID_PARAMS");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn id_display() {
        assert_eq!(RequestId::Number(42).to_string(), "42");
        assert_eq!(RequestId::from("abc").to_string(), "abc");
    }
}
