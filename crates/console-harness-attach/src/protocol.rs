//! JSON-RPC 2.0 messages exchanged by an attaching console and the daemon.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const VERSION: &str = "2.0";

/// Error code for an unknown or unavailable method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Error code for a request that is not valid JSON-RPC.
pub const INVALID_REQUEST: i64 = -32600;

/// Request from console to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// A call without parameters.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            method: method.into(),
            params: Vec::new(),
        }
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Response from daemon to console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response.
    #[must_use]
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn error(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Split into the result or the error.
    ///
    /// # Errors
    /// Returns the error object if the call failed.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(RpcRequest::new(7, "rpc_modules")).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 7, "method": "rpc_modules"}));
    }

    #[test]
    fn test_request_without_params_parses() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"eth_coinbase"}"#).unwrap();
        assert_eq!(req, RpcRequest::new(1, "eth_coinbase"));
    }

    #[test]
    fn test_response_result_and_error() {
        let ok = RpcResponse::result(1, json!({"eth": "1.0"}));
        let text = serde_json::to_string(&ok).unwrap();
        assert!(!text.contains("error"));
        let parsed: RpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.into_result().unwrap(), json!({"eth": "1.0"}));

        let err = RpcResponse::error(2, METHOD_NOT_FOUND, "admin_datadir not available");
        let text = serde_json::to_string(&err).unwrap();
        assert!(!text.contains("result"));
        let parsed: RpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.into_result().unwrap_err().code, METHOD_NOT_FOUND);
    }
}
