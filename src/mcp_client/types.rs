//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types and the MCP payloads the conformance run
//! sends and inspects.

use serde::{Deserialize, Serialize};

use super::errors::McpError;

/// Placeholder for server-provided strings that are missing.
pub const UNKNOWN: &str = "Unknown";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A response line, classified once right after it is read.
///
/// Downstream code matches on the variant and never looks for `result` or
/// `error` keys itself.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// The envelope carried a `result` key (even if its value is `null`).
    Success {
        id: Option<i64>,
        result: serde_json::Value,
    },
    /// The envelope carried a well-formed `error` object.
    Failure {
        id: Option<i64>,
        error: JsonRpcError,
    },
    /// Not JSON, not an object, or neither `result` nor a usable `error`.
    Malformed { raw: String, reason: String },
}

impl RpcResponse {
    /// Classify one response line.
    ///
    /// `result` takes precedence when both `result` and `error` are present.
    pub fn decode(line: &str) -> Self {
        let malformed = |reason: String| RpcResponse::Malformed {
            raw: line.to_string(),
            reason,
        };

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return malformed(format!("invalid JSON: {e}")),
        };

        let serde_json::Value::Object(mut envelope) = value else {
            return malformed("response is not a JSON object".into());
        };

        let id = envelope.get("id").and_then(serde_json::Value::as_i64);

        if let Some(result) = envelope.remove("result") {
            return RpcResponse::Success { id, result };
        }

        match envelope.remove("error") {
            Some(raw_error) => match serde_json::from_value::<JsonRpcError>(raw_error) {
                Ok(error) => RpcResponse::Failure { id, error },
                Err(e) => malformed(format!("error object lacks code/message: {e}")),
            },
            None => malformed("response has neither 'result' nor 'error'".into()),
        }
    }

    /// The response id, if the envelope carried an integer one.
    pub fn id(&self) -> Option<i64> {
        match self {
            RpcResponse::Success { id, .. } | RpcResponse::Failure { id, .. } => *id,
            RpcResponse::Malformed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RpcResponse::Success { .. })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcResponse::Success { .. } => "success",
            RpcResponse::Failure { .. } => "failure",
            RpcResponse::Malformed { .. } => "malformed",
        }
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Client identification sent in `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// `initialize` request parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Handshake payload with an empty capabilities object.
    pub fn new(protocol_version: &str, client_name: &str, client_version: &str) -> Self {
        Self {
            protocol_version: protocol_version.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: client_name.to_string(),
                version: client_version.to_string(),
            },
        }
    }
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    /// Extract server identity from an `initialize` result.
    ///
    /// The result itself must be an object. Inside it, a missing or oddly
    /// typed `serverInfo`, `name` or `version` becomes [`UNKNOWN`] field by
    /// field.
    pub fn from_initialize_result(result: &serde_json::Value) -> Result<Self, McpError> {
        let result = result.as_object().ok_or_else(|| McpError::Protocol {
            code: None,
            reason: format!("initialize result is not an object: {result}"),
        })?;
        let info = result.get("serverInfo");
        Ok(Self {
            name: string_field(info, "name"),
            version: string_field(info, "version"),
        })
    }
}

/// `obj[key]` as an owned string, or [`UNKNOWN`] when absent or not a string.
fn string_field(obj: Option<&serde_json::Value>, key: &str) -> String {
    obj.and_then(|o| o.get(key))
        .and_then(serde_json::Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// One entry of the tool catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Build the tool catalog from a `tools/list` result, keeping server order.
///
/// The result must be an object; a missing `tools` key is an empty catalog.
/// `tools` must be a list of objects. Within an entry, a `name` that is not a
/// string becomes [`UNKNOWN`] and a non-string `description` is dropped.
pub fn parse_tool_catalog(result: &serde_json::Value) -> Result<Vec<ToolDescriptor>, McpError> {
    let invalid = |reason: String| McpError::Protocol {
        code: None,
        reason: format!("invalid tools/list result: {reason}"),
    };

    let result = result
        .as_object()
        .ok_or_else(|| invalid(format!("result is not an object: {result}")))?;

    let Some(tools) = result.get("tools") else {
        return Ok(Vec::new());
    };
    let tools = tools
        .as_array()
        .ok_or_else(|| invalid(format!("'tools' is not a list: {tools}")))?;

    tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            if !tool.is_object() {
                return Err(invalid(format!("tool #{i} is not an object: {tool}")));
            }
            Ok(ToolDescriptor {
                name: string_field(Some(tool), "name"),
                description: tool
                    .get("description")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

/// First text content block of a `tools/call` result, if any.
pub fn first_text_content(result: &serde_json::Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
    }

    #[test]
    fn test_initialize_params_shape() {
        let params = InitializeParams::new("2024-11-05", "test-client", "1.0.0");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            })
        );
    }

    #[test]
    fn test_decode_success() {
        let resp = RpcResponse::decode(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#);
        assert_eq!(
            resp,
            RpcResponse::Success {
                id: Some(1),
                result: serde_json::json!({"tools": []}),
            }
        );
    }

    #[test]
    fn test_decode_null_result_is_success() {
        let resp = RpcResponse::decode(r#"{"id":1,"result":null}"#);
        assert!(resp.is_success());
    }

    #[test]
    fn test_decode_failure() {
        let resp = RpcResponse::decode(r#"{"id":1,"error":{"code":-32601,"message":"Method not found"}}"#);
        match resp {
            RpcResponse::Failure { id, error } => {
                assert_eq!(id, Some(1));
                assert_eq!(error.code, -32601);
                assert_eq!(error.message, "Method not found");
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_result_wins_over_error() {
        let resp = RpcResponse::decode(r#"{"id":1,"result":1,"error":{"code":1,"message":"x"}}"#);
        assert!(resp.is_success());
    }

    #[test]
    fn test_decode_not_json() {
        let resp = RpcResponse::decode("Picked up JAVA_TOOL_OPTIONS: -Xmx1g");
        assert!(matches!(resp, RpcResponse::Malformed { .. }));
        assert_eq!(resp.kind(), "malformed");
        assert_eq!(resp.id(), None);
    }

    #[test]
    fn test_decode_missing_result_and_error() {
        let resp = RpcResponse::decode(r#"{"jsonrpc":"2.0","id":1}"#);
        match resp {
            RpcResponse::Malformed { reason, .. } => assert!(reason.contains("neither")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_non_object() {
        let resp = RpcResponse::decode("[1,2,3]");
        assert!(matches!(resp, RpcResponse::Malformed { .. }));
    }

    #[test]
    fn test_decode_error_without_message() {
        let resp = RpcResponse::decode(r#"{"id":1,"error":"boom"}"#);
        assert!(matches!(resp, RpcResponse::Malformed { .. }));
    }

    #[test]
    fn test_server_info_present() {
        let info = ServerInfo::from_initialize_result(
            &serde_json::json!({"serverInfo": {"name": "x", "version": "1"}}),
        )
        .unwrap();
        assert_eq!(info.name, "x");
        assert_eq!(info.version, "1");
    }

    #[test]
    fn test_server_info_defaults() {
        let partial =
            ServerInfo::from_initialize_result(&serde_json::json!({"serverInfo": {"name": "x"}})).unwrap();
        assert_eq!(partial.name, "x");
        assert_eq!(partial.version, UNKNOWN);

        let absent = ServerInfo::from_initialize_result(&serde_json::json!({})).unwrap();
        assert_eq!(absent.name, UNKNOWN);

        let odd = ServerInfo::from_initialize_result(&serde_json::json!({"serverInfo": "x"})).unwrap();
        assert_eq!(odd.version, UNKNOWN);
    }

    #[test]
    fn test_server_info_fields_are_independent() {
        let info = ServerInfo::from_initialize_result(
            &serde_json::json!({"serverInfo": {"name": 5, "version": "1"}}),
        )
        .unwrap();
        assert_eq!(info.name, UNKNOWN);
        assert_eq!(info.version, "1");
    }

    #[test]
    fn test_server_info_rejects_non_object_result() {
        for result in [serde_json::Value::Null, serde_json::json!("ok"), serde_json::json!([])] {
            let err = ServerInfo::from_initialize_result(&result).unwrap_err();
            assert!(matches!(err, McpError::Protocol { .. }), "{result}");
        }
    }

    #[test]
    fn test_tool_catalog_keeps_server_order() {
        let result = serde_json::json!({"tools": [
            {"name": "zeta", "description": "last alphabetically"},
            {"name": "alpha"},
            {"description": "nameless"}
        ]});
        let tools = parse_tool_catalog(&result).unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", UNKNOWN]);
        assert_eq!(tools[1].description, None);
    }

    #[test]
    fn test_tool_catalog_tolerates_odd_entry_fields() {
        let result = serde_json::json!({"tools": [
            {"name": "a", "description": {"x": 1}},
            {"name": 5, "description": "numeric name"}
        ]});
        let tools = parse_tool_catalog(&result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "a");
        assert_eq!(tools[0].description, None);
        assert_eq!(tools[1].name, UNKNOWN);
        assert_eq!(tools[1].description.as_deref(), Some("numeric name"));
    }

    #[test]
    fn test_tool_catalog_absent_or_empty() {
        assert!(parse_tool_catalog(&serde_json::json!({})).unwrap().is_empty());
        assert!(parse_tool_catalog(&serde_json::json!({"tools": []})).unwrap().is_empty());
    }

    #[test]
    fn test_tool_catalog_rejects_non_object_result() {
        for result in [serde_json::Value::Null, serde_json::json!("tools"), serde_json::json!([])] {
            let err = parse_tool_catalog(&result).unwrap_err();
            assert!(matches!(err, McpError::Protocol { .. }), "{result}");
        }
    }

    #[test]
    fn test_tool_catalog_wrong_shape() {
        let err = parse_tool_catalog(&serde_json::json!({"tools": "none"})).unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }));

        let err = parse_tool_catalog(&serde_json::json!({"tools": ["a"]})).unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }));
    }

    #[test]
    fn test_first_text_content() {
        let result = serde_json::json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(first_text_content(&result), Some("hello"));
        assert_eq!(first_text_content(&serde_json::json!({"content": []})), None);
    }
}
