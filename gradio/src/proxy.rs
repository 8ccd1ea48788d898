//! Per-call upstream tool invocation.
//!
//! Tool calls never reuse a pooled upstream connection: each call opens a
//! fresh MCP session against the space's SSE endpoint, issues the call,
//! relays progress, and tears the session down on every exit path —
//! including cancellation.

use hfmcp_base::error::HfMcpError;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, LoggingLevel, ProgressNotificationParam,
            ProgressToken},
    ClientHandler, RoleClient, ServiceExt,
};
use serde_json::Value;
use std::{borrow::Cow, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::schema::HF_AUTH_HEADER;

/// Receives upstream progress notifications, already rekeyed to the caller's
/// progress token. Implementations forward into the caller's transport.
pub type ProgressSink = Arc<dyn Fn(ProgressNotificationParam) + Send + Sync>;

/// Client handler for one upstream call. The session is exclusive to a single
/// call, so every progress notification it sees belongs to that call; the
/// relay rewrites the token and forwards in arrival order.
#[derive(Clone)]
struct ProgressRelay {
    caller_token: Option<ProgressToken>,
    sink: Option<ProgressSink>,
}

impl ClientHandler for ProgressRelay {
    #[allow(clippy::manual_async_fn)]
    fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: rmcp::service::NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            if let (Some(token), Some(sink)) = (&self.caller_token, &self.sink) {
                let mut params = params;
                params.progress_token = token.clone();
                sink(params);
            }
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: rmcp::service::NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            match params.level {
                LoggingLevel::Emergency
                | LoggingLevel::Alert
                | LoggingLevel::Critical
                | LoggingLevel::Error => {
                    tracing::error!("upstream logger={:?}: {}", params.logger, params.data);
                }
                LoggingLevel::Warning => {
                    tracing::warn!("upstream logger={:?}: {}", params.logger, params.data);
                }
                _ => {
                    tracing::debug!("upstream logger={:?}: {}", params.logger, params.data);
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpaceToolUpstream {
    connect_timeout: Duration,
}

impl SpaceToolUpstream {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Invoke `tool_name` on the space served at `subdomain`.
    ///
    /// Cancelling `cancel` aborts the upstream request; the upstream session
    /// is closed in the tail path regardless of outcome.
    pub async fn call_space_tool(
        &self,
        subdomain: &str,
        private: bool,
        token: Option<&str>,
        tool_name: &str,
        args: Value,
        progress: Option<(ProgressToken, ProgressSink)>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, HfMcpError> {
        let sse_url = format!("https://{subdomain}.hf.space/gradio_api/mcp/sse");

        let mut headers = reqwest::header::HeaderMap::new();
        if private {
            if let Some(token) = token {
                let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| {
                        HfMcpError::InvalidParameter(format!("invalid token header: {e}"))
                    })?;
                headers.insert(HF_AUTH_HEADER, value);
            }
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| HfMcpError::RuntimeError(format!("failed to build http client: {e}")))?;

        let (caller_token, sink) = match progress {
            Some((token, sink)) => (Some(token), Some(sink)),
            None => (None, None),
        };
        let relay = ProgressRelay { caller_token, sink };

        let transport = rmcp::transport::sse_client::SseClientTransport::start_with_client(
            http,
            rmcp::transport::sse_client::SseClientConfig {
                sse_endpoint: sse_url.as_str().into(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| HfMcpError::UpstreamError(format!("SSE transport error: {e}")))?;

        let service = tokio::time::timeout(self.connect_timeout, relay.serve(transport))
            .await
            .map_err(|_| {
                HfMcpError::TimeoutError(format!(
                    "upstream session to {subdomain} did not initialize within {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| HfMcpError::UpstreamError(format!("upstream initialize failed: {e}")))?;

        let arguments = match args {
            Value::Object(map) => Some(map),
            _ => None,
        };

        let result = tokio::select! {
            call_result = service.call_tool(CallToolRequestParam {
                name: Cow::Owned(tool_name.to_string()),
                arguments,
            }) => {
                call_result.map_err(|e| {
                    tracing::error!("upstream call_tool failed for '{}': {}", tool_name, e);
                    HfMcpError::UpstreamError(format!("tool '{tool_name}' failed: {e}"))
                })
            }
            _ = cancel.cancelled() => {
                tracing::info!("upstream call to '{}' cancelled by caller", tool_name);
                Err(HfMcpError::CancelledError(format!(
                    "tool '{tool_name}' call cancelled"
                )))
            }
        };

        // close the upstream session on every exit path
        if let Err(e) = service.cancel().await {
            tracing::debug!("failed to close upstream session to {}: {:?}", subdomain, e);
        }

        result
    }
}
