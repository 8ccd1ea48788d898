//! Stateless JSON transport.
//!
//! Every `POST /mcp` builds a fresh scoped server, processes one request and
//! tears it down. Two optimisations keep the hot path cheap without breaking
//! statelessness: non-core methods are answered by a stub responder with no
//! tool registration, and initialize / non-Gradio tool calls skip remote
//! discovery entirely.
//!
//! Analytics mode keeps an in-memory session table for observability only;
//! it never affects routing.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use hfmcp_app::auth::OAUTH_RESOURCE_HEADER;
use hfmcp_app::{headers as mcp_headers, AuthOutcome, ClientIdentity, McpHeaders, RequestScope,
                ServerFactory};

use crate::config::TransportConfig;
use crate::metrics::{MetricsSnapshot, ServerMetrics};
use crate::rpc::{self, JsonRpcRequest, JsonRpcResponse};
use crate::session::{SessionMetadata, SessionSnapshot};

const WELCOME_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>hfmcp gateway</title></head>
<body>
    <h1>hfmcp gateway (stateless)</h1>
    <p>MCP endpoint: <code>POST /mcp</code> — one JSON-RPC request per call, no session required.</p>
</body>
</html>"#;

/// Sentinel for "this transport does not count connections".
pub const STATELESS_CONNECTION_COUNT: i64 = -1;

pub struct StatelessTransport {
    factory: Arc<ServerFactory>,
    metrics: Arc<ServerMetrics>,
    config: TransportConfig,
    draining: AtomicBool,
    /// Analytics-only session table; `None` when analytics mode is off.
    analytics: Option<DashMap<String, Arc<Mutex<SessionMetadata>>>>,
    /// Bounded diagnostic logging on session-resume failure. Decrements per
    /// use; exhausting it is idempotent.
    temp_log_budget: AtomicI64,
}

impl StatelessTransport {
    pub fn new(factory: Arc<ServerFactory>, config: TransportConfig) -> Arc<Self> {
        let analytics = config.analytics_mode.then(DashMap::new);
        let temp_log_budget = AtomicI64::new(config.temp_log_budget as i64);
        Arc::new(Self {
            factory,
            metrics: Arc::new(ServerMetrics::new()),
            config,
            draining: AtomicBool::new(false),
            analytics,
            temp_log_budget,
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        let api = Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/metrics", get(Self::handle_metrics))
            .route("/sessions", get(Self::handle_sessions))
            .route("/config", get(Self::handle_config));

        Router::new()
            .route(
                "/mcp",
                get(Self::handle_get)
                    .post(Self::handle_post)
                    .delete(Self::handle_delete),
            )
            .nest("/api", api)
            .with_state(self)
    }

    pub fn shutdown(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub async fn cleanup(&self) {
        if let Some(analytics) = &self.analytics {
            analytics.clear();
        }
    }

    /// Stateless transports report a sentinel instead of a live count.
    pub fn get_active_connection_count(&self) -> i64 {
        STATELESS_CONNECTION_COUNT
    }

    pub async fn get_sessions(&self) -> Vec<SessionSnapshot> {
        let Some(analytics) = &self.analytics else {
            return Vec::new();
        };
        // collect first: no lock may be held across an await
        let sessions: Vec<Arc<Mutex<SessionMetadata>>> =
            analytics.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.lock().await.snapshot());
        }
        out
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn get_configuration(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    async fn handle_post(
        State(transport): State<Arc<Self>>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let mut headers = headers;
        mcp_headers::promote_query_params(uri.query(), &mut headers);
        let mcp = McpHeaders::from_header_map(&headers);

        if transport.draining.load(Ordering::SeqCst) {
            let id = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v.get("id").cloned());
            let response =
                JsonRpcResponse::error(id, rpc::SERVER_SHUTTING_DOWN, "server is shutting down");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response();
        }

        let request: JsonRpcRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                transport.metrics.record_http_error(400);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(JsonRpcResponse::error(
                        None,
                        rpc::PARSE_ERROR,
                        format!("invalid JSON-RPC request: {e}"),
                    )),
                )
                    .into_response();
            }
        };

        let started = Instant::now();
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

        // stub responder fast-path: protocol bookkeeping needs no auth, no
        // settings and no tool registration
        if !rpc::is_core_method(&request.method) {
            transport.track_analytics(&mcp, &request, None).await;
            let response = rpc::dispatch_stub(&request);
            transport.metrics.record_request(
                &request.method,
                None,
                started.elapsed(),
                response.as_ref().is_some_and(|r| r.error.is_some()),
                ip.as_deref(),
            );
            return match response {
                Some(response) => (StatusCode::OK, Json(response)).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            };
        }

        let auth = match transport.auth_gate(&mcp).await {
            Ok(outcome) => outcome,
            Err(response) => return response,
        };

        let client = request
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| serde_json::from_value::<ClientIdentity>(c.clone()).ok());
        let client_name = client.as_ref().map(|c| c.name.clone());

        // skip remote discovery when the request cannot touch a Gradio tool
        let skip_gradio = request.method == "initialize"
            || (request.method == "tools/call" && !rpc::targets_gradio_tool(&request));

        let scope = RequestScope {
            headers: mcp.clone(),
            client,
        };
        let server = transport.factory.build(scope, auth.clone(), skip_gradio).await;

        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let is_gradio_call = rpc::targets_gradio_tool(&request);
        let response = rpc::dispatch(&server, &request, None, cancel.clone()).await;
        guard.disarm();

        if request.method == "tools/call" {
            transport.metrics.record_tool_call(client_name.as_deref());
            if is_gradio_call && rpc::tool_call_failed(&response) {
                transport.metrics.record_gradio_failure();
            }
        }
        if request.method == "initialize" {
            transport
                .metrics
                .record_connection(auth.is_authenticated(), client_name.as_deref());
        }

        let session_header = transport
            .track_analytics(&mcp, &request, Some(&auth))
            .await;

        transport.metrics.record_request(
            &request.method,
            client_name.as_deref(),
            started.elapsed(),
            response.as_ref().is_some_and(|r| r.error.is_some()),
            ip.as_deref(),
        );

        match (response, session_header) {
            (Some(response), Some(session_id)) => (
                StatusCode::OK,
                [(mcp_headers::SESSION_ID_HEADER, session_id)],
                Json(response),
            )
                .into_response(),
            (Some(response), None) => (StatusCode::OK, Json(response)).into_response(),
            (None, _) => StatusCode::ACCEPTED.into_response(),
        }
    }

    /// Analytics-mode session tracking. Returns the session id to attach to
    /// the response when this request was an initialize.
    async fn track_analytics(
        &self,
        mcp: &McpHeaders,
        request: &JsonRpcRequest,
        auth: Option<&AuthOutcome>,
    ) -> Option<String> {
        let analytics = self.analytics.as_ref()?;

        if request.method == "initialize" {
            let session_id = uuid::Uuid::new_v4().to_string();
            let mut meta = SessionMetadata::new(
                session_id.clone(),
                auth.is_some_and(|a| a.is_authenticated()),
                None,
            );
            meta.client_info = request
                .params
                .as_ref()
                .and_then(|p| p.get("clientInfo"))
                .and_then(|c| serde_json::from_value(c.clone()).ok());
            meta.touch();
            analytics.insert(session_id.clone(), Arc::new(Mutex::new(meta)));
            self.metrics.record_session_created();
            return Some(session_id);
        }

        if let Some(session_id) = mcp.session_id.as_deref() {
            let session = analytics.get(session_id).map(|e| e.value().clone());
            match session {
                Some(session) => session.lock().await.touch(),
                None => {
                    self.metrics.record_session_resume_failed();
                    self.log_resume_failure(session_id, &request.method);
                }
            }
        }
        None
    }

    /// Capped diagnostic logging: each use decrements the budget; once it
    /// reaches zero further failures are silent.
    fn log_resume_failure(&self, session_id: &str, method: &str) {
        let remaining = self.temp_log_budget.fetch_sub(1, Ordering::SeqCst);
        if remaining > 0 {
            tracing::warn!(
                "analytics session {} not found for {} ({} diagnostics left)",
                session_id,
                method,
                remaining - 1
            );
        } else {
            // keep the budget pinned so repeated failures cannot underflow
            self.temp_log_budget.store(0, Ordering::SeqCst);
        }
    }

    async fn auth_gate(&self, mcp: &McpHeaders) -> Result<AuthOutcome, Response> {
        let outcome = self.factory.authorize(mcp).await;
        match &outcome {
            AuthOutcome::InvalidToken => {
                self.metrics.record_http_error(401);
                Err((
                    StatusCode::UNAUTHORIZED,
                    [(OAUTH_RESOURCE_HEADER, oauth_hint())],
                    "invalid token",
                )
                    .into_response())
            }
            AuthOutcome::Anonymous | AuthOutcome::ValidatorUnavailable if mcp.force_auth => {
                self.metrics.record_http_error(401);
                Err((
                    StatusCode::UNAUTHORIZED,
                    [(OAUTH_RESOURCE_HEADER, oauth_hint())],
                    "authentication required",
                )
                    .into_response())
            }
            _ => Ok(outcome),
        }
    }

    async fn handle_get(State(transport): State<Arc<Self>>) -> Response {
        if transport.config.strict_compliance {
            transport.metrics.record_http_error(405);
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }
        Html(WELCOME_HTML).into_response()
    }

    /// `DELETE /mcp` removes an analytics session; it is rejected when
    /// analytics mode is off.
    async fn handle_delete(State(transport): State<Arc<Self>>, headers: HeaderMap) -> Response {
        let Some(analytics) = transport.analytics.as_ref() else {
            transport.metrics.record_http_error(405);
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::METHOD_NOT_ALLOWED,
                    "DELETE is only available in analytics mode",
                )),
            )
                .into_response();
        };

        let mcp = McpHeaders::from_header_map(&headers);
        let Some(session_id) = mcp.session_id.as_deref() else {
            transport.metrics.record_http_error(400);
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::INVALID_PARAMS,
                    "missing mcp-session-id header",
                )),
            )
                .into_response();
        };

        if analytics.remove(session_id).is_some() {
            transport.metrics.record_session_deleted();
            StatusCode::OK.into_response()
        } else {
            transport.metrics.record_http_error(404);
            (
                StatusCode::NOT_FOUND,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::SESSION_NOT_FOUND,
                    format!("unknown session: {session_id}"),
                )),
            )
                .into_response()
        }
    }

    async fn handle_metrics(State(transport): State<Arc<Self>>) -> Json<MetricsSnapshot> {
        Json(transport.get_metrics())
    }

    async fn handle_sessions(State(transport): State<Arc<Self>>) -> Json<Vec<SessionSnapshot>> {
        Json(transport.get_sessions().await)
    }

    async fn handle_config(State(transport): State<Arc<Self>>) -> Json<Value> {
        Json(transport.get_configuration())
    }
}

fn oauth_hint() -> String {
    format!(
        "{}/.well-known/oauth-protected-resource",
        hfmcp_base::HF_HUB_URL.clone()
    )
}

/// Boot the stateless transport on `bind_addr` with graceful shutdown.
pub async fn boot_stateless_server(
    transport: Arc<StatelessTransport>,
    bind_addr: &str,
    lock: hfmcp_base::shutdown::ShutdownLock,
) -> anyhow::Result<()> {
    let app = transport.clone().router();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("MCP stateless JSON server started on {}", bind_addr);

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutting down MCP server...");
                let _ = tx.send(());
            }
            Err(e) => tracing::error!("failed to listen for ctrl_c: {:?}", e),
        }
    });

    let drain = transport.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            rx.await.ok();
            drain.shutdown();
        })
        .await?;

    transport.cleanup().await;
    lock.unlock();
    Ok(())
}
