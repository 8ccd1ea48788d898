//! Stateful streaming HTTP gateway.
//!
//! Sessions are created on initialize and carried in the `mcp-session-id`
//! header; `GET /mcp` attaches the session's SSE stream. Suitable for MCP
//! clients that keep a long-lived connection.
//!
//! # Environment Variables
//!
//! - `MCP_ADDR`: bind address (default: 127.0.0.1:8000)
//! - `HF_HUB_URL`: hub endpoint (default: https://huggingface.co)
//! - `STALE_TIMEOUT_MS`, `HEARTBEAT_INTERVAL_MS`, `PING_INTERVAL_MS`,
//!   `PING_FAILURE_THRESHOLD`: session lifecycle tuning
//! - See `TransportConfig` and `DiscoveryConfig` for the full surface.

use anyhow::Result;
use dotenvy::dotenv;
use hfmcp_app::ServerFactory;
use hfmcp_base::shutdown;
use mcp_server::server::streamable_http::boot_streamable_http_server;
use mcp_server::{StreamableHttpTransport, TransportConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let conf = hfmcp_base::logging::load_logging_config_from_env().unwrap_or_default();
    let _guard = hfmcp_base::logging::tracing_init(conf)?;

    tracing::info!("Starting hfmcp streaming HTTP server");

    let factory = Arc::new(ServerFactory::from_env());
    let transport = StreamableHttpTransport::new(factory, TransportConfig::from_env(300_000));

    let bind_addr = hfmcp_base::MCP_ADDR.to_string();
    let (lock, mut wait) = shutdown::create_lock_and_wait();

    boot_streamable_http_server(transport, &bind_addr, lock, None).await?;

    wait.wait().await;
    tracing::info!("hfmcp streaming HTTP server shutdown");
    Ok(())
}
