//! JSON-RPC 2.0 envelopes around executor calls

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;

use crate::core::errors::ChainsimError;

pub const JSONRPC_VERSION: &str = "2.0";
const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Invalid request object
pub const INVALID_REQUEST_CODE: i32 = -32600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Arc<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            method: method.into(),
            params,
            id: Arc::new(id),
        }
    }

    /// Params as handed to the connector; absent params become an empty list
    pub fn params_or_empty(&self) -> Value {
        self.params
            .clone()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }
}

/// Response carrying either `result` or `error`, never both
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Arc<Value>,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Arc<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(code: i32, message: String, id: Arc<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    pub fn from_error(err: &ChainsimError, id: Arc<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError::from(err)),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&ChainsimError> for JsonRpcError {
    fn from(err: &ChainsimError) -> Self {
        match err {
            // Connector errors travel unchanged
            ChainsimError::Connector(inner) => Self {
                code: inner.code,
                message: inner.message.clone(),
                data: inner.data.clone(),
            },
            other => Self {
                code: other.rpc_code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ConnectorError;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: JsonRpcRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "eth_accounts" })).unwrap();
        assert_eq!(request.id.as_ref(), &Value::Null);
        assert_eq!(request.params_or_empty(), json!([]));
    }

    #[test]
    fn test_success_omits_error() {
        let response = JsonRpcResponse::success(json!("0x1"), Arc::new(json!(7)));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({ "jsonrpc": "2.0", "result": "0x1", "id": 7 }));
    }

    #[test]
    fn test_error_mapping() {
        let not_found = JsonRpcError::from(&ChainsimError::method_not_found("eth_foo"));
        assert_eq!(not_found.code, -32601);
        assert_eq!(
            not_found.message,
            "The method eth_foo does not exist/is not available"
        );

        let connector = ChainsimError::from(
            ConnectorError::new(3, "execution reverted").with_data(json!("0xdead")),
        );
        let mapped = JsonRpcError::from(&connector);
        assert_eq!(mapped.code, 3);
        assert_eq!(mapped.data, Some(json!("0xdead")));
    }
}
