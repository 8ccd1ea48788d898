//! JSON-RPC envelope and method dispatch.
//!
//! The HTTP transports speak JSON-RPC directly; this module owns the shared
//! error vocabulary and the bridge from envelopes to [`GatewayServer`] calls.
//! Payload shapes reuse `rmcp::model` types so the wire format matches the
//! stdio transport exactly.

use rmcp::model::ProgressToken;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use hfmcp_app::GatewayServer;
use hfmcp_base::error::HfMcpError;
use hfmcp_gradio::naming::is_gradio_tool_name;
use hfmcp_gradio::ProgressSink;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-06-18";

// Shared protocol error vocabulary.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;
pub const SERVER_SHUTTING_DOWN: i64 = -32000;
pub const SESSION_NOT_FOUND: i64 = -32001;
pub const METHOD_NOT_ALLOWED: i64 = -32002;

/// Methods that require the full scoped tool surface. Everything else can be
/// answered by protocol bookkeeping alone.
pub const CORE_METHODS: &[&str] = &[
    "initialize",
    "tools/list",
    "tools/call",
    "prompts/list",
    "prompts/get",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }

    /// Target tool of a `tools/call` request, when present.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method != "tools/call" {
            return None;
        }
        self.params.as_ref()?.get("name")?.as_str()
    }

    /// `params._meta.progressToken`, decoded through rmcp's model type.
    pub fn progress_token(&self) -> Option<ProgressToken> {
        let raw = self.params.as_ref()?.get("_meta")?.get("progressToken")?;
        serde_json::from_value(raw.clone()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Error responses carry the original request's id, or null for
    /// notifications and unparseable requests.
    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

pub fn is_core_method(method: &str) -> bool {
    CORE_METHODS.contains(&method)
}

/// Does this `tools/call` target a Gradio-proxied tool? Used by the
/// skip-gradio optimisation.
pub fn targets_gradio_tool(request: &JsonRpcRequest) -> bool {
    request.tool_name().is_some_and(is_gradio_tool_name)
}

/// Dispatch a request against a scoped server. Returns `None` for
/// notifications and for cancelled calls (a cancelled request gets no
/// response).
pub async fn dispatch(
    server: &GatewayServer,
    request: &JsonRpcRequest,
    progress_sink: Option<ProgressSink>,
    cancel: CancellationToken,
) -> Option<JsonRpcResponse> {
    if request.method.starts_with("notifications/") {
        return None;
    }
    let id = request.id.clone();

    match request.method.as_str() {
        "initialize" => {
            let requested_version = request
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION);
            Some(JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": requested_version,
                    "capabilities": server.capabilities(),
                    "serverInfo": {
                        "name": hfmcp_base::APP_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "instructions": server.instructions(),
                }),
            ))
        }
        "ping" => Some(JsonRpcResponse::success(id, json!({}))),
        "tools/list" => {
            let tools = server.list_tools().await;
            match serde_json::to_value(&tools) {
                Ok(tools) => Some(JsonRpcResponse::success(id, json!({"tools": tools}))),
                Err(e) => Some(JsonRpcResponse::error(
                    id,
                    INTERNAL_ERROR,
                    format!("failed to serialize tools: {e}"),
                )),
            }
        }
        "tools/call" => {
            let Some(name) = request.tool_name().map(str::to_string) else {
                return Some(JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "tools/call requires a tool name",
                ));
            };
            let arguments = request
                .params
                .as_ref()
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or(json!({}));
            let progress = match (request.progress_token(), progress_sink) {
                (Some(token), Some(sink)) => Some((token, sink)),
                _ => None,
            };

            match server.call_tool(&name, arguments, progress, cancel).await {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(result) => Some(JsonRpcResponse::success(id, result)),
                    Err(e) => Some(JsonRpcResponse::error(
                        id,
                        INTERNAL_ERROR,
                        format!("failed to serialize tool result: {e}"),
                    )),
                },
                Err(e) if e.is_cancellation() => None,
                Err(e) if e.is_client_error() => {
                    Some(JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()))
                }
                Err(e) => Some(JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string())),
            }
        }
        "prompts/list" => Some(JsonRpcResponse::success(id, json!({"prompts": []}))),
        "prompts/get" => Some(JsonRpcResponse::error(
            id,
            INVALID_PARAMS,
            "unknown prompt",
        )),
        "resources/list" => Some(JsonRpcResponse::success(id, json!({"resources": []}))),
        "resources/templates/list" => {
            Some(JsonRpcResponse::success(id, json!({"resourceTemplates": []})))
        }
        other => Some(JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

/// Answer a non-core method with protocol bookkeeping only. Used by the
/// stateless transport's stub fast-path; no tool registration happens here.
pub fn dispatch_stub(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.method.starts_with("notifications/") {
        return None;
    }
    let id = request.id.clone();
    match request.method.as_str() {
        "ping" => Some(JsonRpcResponse::success(id, json!({}))),
        "logging/setLevel" => Some(JsonRpcResponse::success(id, json!({}))),
        "resources/list" => Some(JsonRpcResponse::success(id, json!({"resources": []}))),
        "resources/templates/list" => {
            Some(JsonRpcResponse::success(id, json!({"resourceTemplates": []})))
        }
        "resources/read" => Some(JsonRpcResponse::error(
            id,
            INVALID_PARAMS,
            "unknown resource",
        )),
        "completion/complete" => Some(JsonRpcResponse::success(
            id,
            json!({"completion": {"values": [], "total": 0, "hasMore": false}}),
        )),
        other => Some(JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

/// Map a transport-level gateway error onto the shared vocabulary.
pub fn error_code_for(e: &HfMcpError) -> i64 {
    if e.is_client_error() {
        INVALID_PARAMS
    } else {
        INTERNAL_ERROR
    }
}

/// Did a dispatched `tools/call` fail? Protocol errors and `isError` tool
/// results count; an absent response means cancellation, which does not.
pub fn tool_call_failed(response: &Option<JsonRpcResponse>) -> bool {
    match response {
        Some(response) => {
            response.error.is_some()
                || response
                    .result
                    .as_ref()
                    .and_then(|r| r.get("isError"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, id: Option<Value>, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_notification_detection() {
        assert!(request("notifications/initialized", Some(json!(1)), None).is_notification());
        assert!(request("tools/list", None, None).is_notification());
        assert!(!request("tools/list", Some(json!(1)), None).is_notification());
    }

    #[test]
    fn test_tool_name_extraction() {
        let req = request(
            "tools/call",
            Some(json!(1)),
            Some(json!({"name": "gr1_infer", "arguments": {}})),
        );
        assert_eq!(req.tool_name(), Some("gr1_infer"));
        assert!(targets_gradio_tool(&req));

        let req = request(
            "tools/call",
            Some(json!(1)),
            Some(json!({"name": "hub_search"})),
        );
        assert!(!targets_gradio_tool(&req));
    }

    #[test]
    fn test_progress_token_extraction() {
        let req = request(
            "tools/call",
            Some(json!(1)),
            Some(json!({"name": "x", "_meta": {"progressToken": 7}})),
        );
        assert!(req.progress_token().is_some());

        let req = request("tools/call", Some(json!(1)), Some(json!({"name": "x"})));
        assert!(req.progress_token().is_none());
    }

    #[test]
    fn test_error_response_carries_null_id_for_notifications() {
        let response = JsonRpcResponse::error(None, SERVER_SHUTTING_DOWN, "draining");
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.as_ref().unwrap().code, SERVER_SHUTTING_DOWN);

        let response = JsonRpcResponse::error(Some(json!(9)), SESSION_NOT_FOUND, "gone");
        assert_eq!(response.id, json!(9));
    }

    #[test]
    fn test_core_method_set() {
        for method in ["initialize", "tools/list", "tools/call", "prompts/list", "prompts/get"] {
            assert!(is_core_method(method));
        }
        assert!(!is_core_method("resources/list"));
        assert!(!is_core_method("ping"));
    }

    #[test]
    fn test_stub_dispatch() {
        let pong = dispatch_stub(&request("ping", Some(json!(3)), None)).unwrap();
        assert_eq!(pong.result, Some(json!({})));
        assert_eq!(pong.id, json!(3));

        let resources = dispatch_stub(&request("resources/list", Some(json!(4)), None)).unwrap();
        assert_eq!(resources.result, Some(json!({"resources": []})));

        assert!(dispatch_stub(&request("notifications/initialized", None, None)).is_none());

        let unknown = dispatch_stub(&request("sampling/createMessage", Some(json!(5)), None))
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_request_roundtrip() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, Some(json!(1)));
        assert!(req.params.is_none());
    }
}
