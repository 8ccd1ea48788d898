//! MCP transports for the hfmcp gateway.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MCP Client                              │
//! │          (Claude Desktop, Cursor, openai-mcp, …)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ MCP protocol (JSON-RPC)
//!                       │ via stdio, streaming HTTP or stateless JSON
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   mcp-server crate                           │
//! │   transports + sessions + metrics + JSON-RPC dispatch        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ direct call
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   hfmcp-app crate                            │
//! │   ServerFactory → GatewayServer (selection + gradio proxy)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three transports share the base contract (initialize/cleanup/shutdown,
//! session snapshots, metrics, configuration):
//!
//! - [`server::streamable_http`]: stateful streaming HTTP with SSE delivery,
//!   heartbeats, protocol pings and stale eviction
//! - [`server::stateless`]: per-request isolation with an optional
//!   analytics-only session table
//! - [`server::stdio`]: rmcp stdio binding for local clients

pub mod config;
pub mod handler;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod session;

pub use config::TransportConfig;
pub use handler::McpHandler;
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use server::stateless::StatelessTransport;
pub use server::stdio::boot_stdio_server;
pub use server::streamable_http::StreamableHttpTransport;
