//! Stdio gateway for local MCP clients.
//!
//! The scoped server is built once at startup from environment configuration
//! (there are no per-request headers on stdio):
//!
//! - `HF_TOKEN`: hub token for authenticated access
//! - `MCP_BOUQUET` / `MCP_MIX` / `MCP_GRADIO`: same semantics as the
//!   `x-mcp-*` headers
//! - `MCP_NO_IMAGE_CONTENT`: strip image blocks from Gradio results

use anyhow::Result;
use dotenvy::dotenv;
use hfmcp_app::{McpHeaders, RequestScope, ServerFactory};
use mcp_server::{boot_stdio_server, McpHandler};
use std::sync::Arc;

fn headers_from_env() -> McpHeaders {
    McpHeaders {
        token: std::env::var("HF_TOKEN").ok(),
        bouquet: std::env::var("MCP_BOUQUET").ok(),
        mix: std::env::var("MCP_MIX").ok(),
        gradio: std::env::var("MCP_GRADIO").ok(),
        no_image_content: hfmcp_base::env_flag("MCP_NO_IMAGE_CONTENT", false),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // stdio carries the protocol on stdout; logs must stay on stderr or in a
    // file
    let conf = hfmcp_base::logging::load_logging_config_from_env().unwrap_or_default();
    let _guard = hfmcp_base::logging::tracing_init(conf)?;

    let factory = ServerFactory::from_env();
    let headers = headers_from_env();
    let auth = factory.authorize(&headers).await;
    let scope = RequestScope {
        headers,
        client: None,
    };
    let server = Arc::new(factory.build(scope, auth, false).await);

    boot_stdio_server(McpHandler::new(server)).await?;

    tracing::info!("hfmcp stdio server shutdown");
    Ok(())
}
