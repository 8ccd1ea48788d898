//! Stateless JSON-RPC gateway.
//!
//! Every POST builds a fresh scoped server and tears it down afterwards; no
//! session state affects routing. Set `ANALYTICS_MODE=true` to keep an
//! observability-only session table (enables `DELETE /mcp`).
//!
//! # Environment Variables
//!
//! - `MCP_ADDR`: bind address (default: 127.0.0.1:8000)
//! - `ANALYTICS_MODE`: in-memory analytics session table (default: false)
//! - `STRICT_COMPLIANCE`: reject `GET /mcp` with 405 (default: false)
//! - `TEMP_LOG_BUDGET`: bounded session-resume diagnostics (default: 0)

use anyhow::Result;
use dotenvy::dotenv;
use hfmcp_app::ServerFactory;
use hfmcp_base::shutdown;
use mcp_server::server::stateless::boot_stateless_server;
use mcp_server::{StatelessTransport, TransportConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let conf = hfmcp_base::logging::load_logging_config_from_env().unwrap_or_default();
    let _guard = hfmcp_base::logging::tracing_init(conf)?;

    tracing::info!("Starting hfmcp stateless JSON server");

    let factory = Arc::new(ServerFactory::from_env());
    let transport = StatelessTransport::new(factory, TransportConfig::from_env(300_000));

    let bind_addr = hfmcp_base::MCP_ADDR.to_string();
    let (lock, mut wait) = shutdown::create_lock_and_wait();

    boot_stateless_server(transport, &bind_addr, lock).await?;

    wait.wait().await;
    tracing::info!("hfmcp stateless JSON server shutdown");
    Ok(())
}
