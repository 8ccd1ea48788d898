use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};

use crate::handler::McpHandler;

/// Boot the MCP server in stdio mode, for clients that communicate over
/// stdin/stdout (e.g. Claude Desktop).
pub async fn boot_stdio_server(handler: McpHandler) -> Result<()> {
    tracing::info!("Starting MCP stdio server");

    let service = handler.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("MCP stdio serve error: {:?}", e);
    })?;

    service.waiting().await?;
    Ok(())
}
