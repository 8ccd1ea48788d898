//! rmcp handler binding for the stdio transport.

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::Value;
use std::sync::Arc;

use hfmcp_app::GatewayServer;
use hfmcp_base::error::HfMcpError;
use hfmcp_gradio::ProgressSink;

#[derive(Clone)]
pub struct McpHandler {
    server: Arc<GatewayServer>,
}

impl McpHandler {
    pub fn new(server: Arc<GatewayServer>) -> Self {
        Self { server }
    }
}

fn to_mcp_error(e: HfMcpError) -> McpError {
    if e.is_client_error() {
        McpError::invalid_params(e.to_string(), None)
    } else {
        McpError::internal_error(e.to_string(), None)
    }
}

impl ServerHandler for McpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(self.server.instructions()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.server.list_tools().await,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        // progress relay: forward upstream notifications to the caller via
        // the session peer, keyed by the caller's own token. A single drain
        // task keeps the notifications in upstream order.
        let progress = context.meta.get_progress_token().map(|token| {
            let peer = context.peer.clone();
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(params) = rx.recv().await {
                    if let Err(e) = peer.notify_progress(params).await {
                        tracing::debug!("progress relay to caller failed: {}", e);
                        break;
                    }
                }
            });
            let sink: ProgressSink = Arc::new(move |params| {
                let _ = tx.send(params);
            });
            (token, sink)
        });

        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| serde_json::json!({}));

        self.server
            .call_tool(&request.name, args, progress, context.ct.clone())
            .await
            .map_err(to_mcp_error)
    }
}
