//! Stateful streaming HTTP transport.
//!
//! `POST /mcp` carries JSON-RPC requests (initialize creates a session),
//! `GET /mcp` attaches the session's SSE stream, `DELETE /mcp` terminates a
//! session. Background tasks detect dead streams, evict stale sessions and
//! keep live ones fresh with protocol pings.
//!
//! Within a session, request handling is serialized; across sessions it is
//! concurrent. Closing the stream, an explicit DELETE or shutdown cancels
//! every in-flight upstream call through the session's cancellation token.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use hfmcp_app::auth::OAUTH_RESOURCE_HEADER;
use hfmcp_app::{headers as mcp_headers, AuthOutcome, ClientIdentity, GatewayServer, McpHeaders,
                RequestScope, ServerFactory};
use hfmcp_gradio::ProgressSink;

use crate::config::TransportConfig;
use crate::metrics::{MetricsSnapshot, ServerMetrics};
use crate::rpc::{self, JsonRpcRequest, JsonRpcResponse};
use crate::session::{SessionMetadata, SessionSnapshot};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>hfmcp gateway</title></head>
<body>
    <h1>hfmcp gateway</h1>
    <p>MCP endpoint: <code>POST /mcp</code> (streaming HTTP, sessions via <code>mcp-session-id</code>)</p>
    <p>Health check: <code>GET /api/health</code></p>
</body>
</html>"#;

struct StatefulSession {
    meta: Mutex<SessionMetadata>,
    server: Arc<GatewayServer>,
    /// Outbound JSON-RPC messages destined for the SSE stream.
    out_tx: mpsc::Sender<Value>,
    out_rx: Mutex<Option<mpsc::Receiver<Value>>>,
    /// Session-scoped; cancelling it aborts every in-flight upstream call.
    cancel: CancellationToken,
    /// Serializes request handling within the session.
    gate: Mutex<()>,
    /// In-flight per-request cancellation tokens, keyed by request id.
    pending: DashMap<String, CancellationToken>,
    /// Deduplicates in-flight keep-alive pings.
    ping_in_flight: AtomicBool,
}

impl StatefulSession {
    fn request_key(id: &Value) -> String {
        id.to_string()
    }
}

pub struct StreamableHttpTransport {
    sessions: DashMap<String, Arc<StatefulSession>>,
    factory: Arc<ServerFactory>,
    metrics: Arc<ServerMetrics>,
    config: TransportConfig,
    draining: AtomicBool,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl StreamableHttpTransport {
    pub fn new(factory: Arc<ServerFactory>, config: TransportConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            factory,
            metrics: Arc::new(ServerMetrics::new()),
            config,
            draining: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Bind routes and start the background timers.
    pub async fn initialize(self: Arc<Self>) -> Router {
        self.clone().spawn_background_tasks().await;
        self.router()
    }

    pub fn router(self: Arc<Self>) -> Router {
        let api = Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/metrics", get(Self::handle_metrics))
            .route("/sessions", get(Self::handle_sessions))
            .route("/config", get(Self::handle_config));

        Router::new()
            .route("/", get(|| async { Html(INDEX_HTML) }))
            .route(
                "/mcp",
                get(Self::handle_get)
                    .post(Self::handle_post)
                    .delete(Self::handle_delete),
            )
            .nest("/api", api)
            .with_state(self)
    }

    /// Mark draining: new work is rejected with `server_shutting_down`.
    pub fn shutdown(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Close all sessions and stop the background timers.
    pub async fn cleanup(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove_session(&id, "shutdown").await;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    pub fn get_active_connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn get_sessions(&self) -> Vec<SessionSnapshot> {
        // collect first: no lock may be held across an await
        let sessions: Vec<Arc<StatefulSession>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.meta.lock().await.snapshot());
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

    async fn spawn_background_tasks(self: Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        // heartbeat: drop sessions whose SSE stream is gone
        let transport = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(transport.config.heartbeat_interval);
            loop {
                ticker.tick().await;
                transport.heartbeat_sweep().await;
            }
        }));

        // stale sweep
        let transport = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(transport.config.stale_check_interval);
            loop {
                ticker.tick().await;
                transport.stale_sweep().await;
            }
        }));

        // keep-alive pings
        if self.config.ping_enabled {
            let transport = self.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(transport.config.ping_interval);
                loop {
                    ticker.tick().await;
                    transport.ping_sweep().await;
                }
            }));
        }
    }

    async fn heartbeat_sweep(&self) {
        let dead: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().out_tx.is_closed())
            .map(|entry| entry.key().clone())
            .collect();
        for id in dead {
            tracing::info!("session {} stream closed, removing", id);
            self.remove_session(&id, "dead stream").await;
            self.metrics.record_session_cleaned();
        }
    }

    async fn stale_sweep(&self) {
        let candidates: Vec<(String, Arc<StatefulSession>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut stale = Vec::new();
        for (id, session) in candidates {
            if session.meta.lock().await.is_stale(self.config.stale_timeout) {
                stale.push(id);
            }
        }
        for id in stale {
            tracing::info!("session {} stale, evicting", id);
            self.remove_session(&id, "stale").await;
            self.metrics.record_session_cleaned();
        }
    }

    /// Protocol-level keep-alive: a ping request is written to the session's
    /// stream. Delivery counts as success and refreshes the session; a full
    /// or closed stream counts as failure and moves the session toward
    /// distressed. In-flight pings are deduplicated per session.
    async fn ping_sweep(&self) {
        let sessions: Vec<Arc<StatefulSession>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        for session in sessions {
            if session.ping_in_flight.swap(true, Ordering::SeqCst) {
                continue;
            }
            let ping = json!({
                "jsonrpc": rpc::JSONRPC_VERSION,
                "id": format!("ping-{}", uuid::Uuid::new_v4()),
                "method": "ping",
            });
            let delivered = session.out_tx.try_send(ping).is_ok();
            {
                let mut meta = session.meta.lock().await;
                meta.record_ping_attempt();
                if delivered {
                    meta.record_ping_success();
                } else {
                    meta.record_ping_failure(self.config.ping_failure_threshold);
                }
            }
            self.metrics.record_ping(delivered);
            session.ping_in_flight.store(false, Ordering::SeqCst);
        }
    }

    async fn remove_session(&self, id: &str, reason: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            tracing::debug!("closing session {} ({})", id, reason);
            session.cancel.cancel();
            let mut meta = session.meta.lock().await;
            meta.disconnect();
            self.metrics
                .record_disconnect(meta.client_info.as_ref().map(|c| c.name.as_str()));
        }
    }

    fn draining_response(request_id: Option<Value>) -> Response {
        let body = JsonRpcResponse::error(
            request_id,
            rpc::SERVER_SHUTTING_DOWN,
            "server is shutting down",
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }

    fn request_ip(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
    }

    /// Shared authorization gate. `Err` carries the finished 401 response.
    async fn auth_gate(&self, mcp: &McpHeaders) -> Result<AuthOutcome, Response> {
        let outcome = self.factory.authorize(mcp).await;
        match &outcome {
            AuthOutcome::InvalidToken => {
                self.metrics.record_http_error(401);
                let response = (
                    StatusCode::UNAUTHORIZED,
                    [(OAUTH_RESOURCE_HEADER, oauth_hint())],
                    "invalid token",
                )
                    .into_response();
                Err(response)
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
            return Self::draining_response(id);
        }

        let auth = match transport.auth_gate(&mcp).await {
            Ok(outcome) => outcome,
            Err(response) => return response,
        };

        let raw: Value = match serde_json::from_slice(&body) {
            Ok(raw) => raw,
            Err(e) => {
                transport.metrics.record_http_error(400);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(JsonRpcResponse::error(
                        None,
                        rpc::PARSE_ERROR,
                        format!("invalid JSON: {e}"),
                    )),
                )
                    .into_response();
            }
        };

        // a body without a method is a client response (e.g. the pong for a
        // keep-alive ping) delivered over POST
        if raw.get("method").is_none() {
            return transport.handle_client_response(&mcp, raw).await;
        }

        let request: JsonRpcRequest = match serde_json::from_value(raw) {
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

        if request.method == "initialize" {
            return transport
                .handle_initialize(mcp, auth, request, &headers)
                .await;
        }
        transport.handle_session_request(mcp, request).await
    }

    async fn handle_initialize(
        &self,
        mcp: McpHeaders,
        auth: AuthOutcome,
        request: JsonRpcRequest,
        headers: &HeaderMap,
    ) -> Response {
        let started = Instant::now();
        let client = request
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| serde_json::from_value::<ClientIdentity>(c.clone()).ok());
        let capabilities = request
            .params
            .as_ref()
            .and_then(|p| p.get("capabilities"))
            .cloned();

        let scope = RequestScope {
            headers: mcp.clone(),
            client: client.clone(),
        };
        // the scoped server lives as long as the session; discovery itself is
        // lazy and only runs when tools are listed or called
        let server = Arc::new(self.factory.build(scope, auth.clone(), false).await);

        let session_id = uuid::Uuid::new_v4().to_string();
        let mut meta = SessionMetadata::new(
            session_id.clone(),
            auth.is_authenticated(),
            Self::request_ip(headers),
        );
        meta.client_info = client.clone();
        meta.capabilities = capabilities;
        meta.touch();

        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Arc::new(StatefulSession {
            meta: Mutex::new(meta),
            server: server.clone(),
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            cancel: CancellationToken::new(),
            gate: Mutex::new(()),
            pending: DashMap::new(),
            ping_in_flight: AtomicBool::new(false),
        });
        self.sessions.insert(session_id.clone(), session.clone());

        self.metrics.record_session_created();
        self.metrics
            .record_connection(auth.is_authenticated(), client.as_ref().map(|c| c.name.as_str()));

        let response = rpc::dispatch(&server, &request, None, session.cancel.child_token())
            .await
            .unwrap_or_else(|| JsonRpcResponse::success(request.id.clone(), json!({})));

        self.metrics.record_request(
            &request.method,
            client.as_ref().map(|c| c.name.as_str()),
            started.elapsed(),
            response.error.is_some(),
            Self::request_ip(headers).as_deref(),
        );

        tracing::info!(
            "session {} initialized (client={:?})",
            session_id,
            client.as_ref().map(|c| &c.name)
        );

        (
            StatusCode::OK,
            [(mcp_headers::SESSION_ID_HEADER, session_id)],
            Json(response),
        )
            .into_response()
    }

    async fn handle_session_request(&self, mcp: McpHeaders, request: JsonRpcRequest) -> Response {
        let Some(session_id) = mcp.session_id.clone() else {
            self.metrics.record_http_error(400);
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    request.id.clone(),
                    rpc::INVALID_PARAMS,
                    "missing mcp-session-id header",
                )),
            )
                .into_response();
        };
        let Some(session) = self.sessions.get(&session_id).map(|e| e.value().clone()) else {
            self.metrics.record_session_resume_failed();
            self.metrics.record_http_error(404);
            return (
                StatusCode::NOT_FOUND,
                Json(JsonRpcResponse::error(
                    request.id.clone(),
                    rpc::SESSION_NOT_FOUND,
                    format!("unknown session: {session_id}"),
                )),
            )
                .into_response();
        };

        // cancellation notifications bypass the gate so they can reach an
        // in-flight request
        if request.method == "notifications/cancelled" {
            if let Some(request_id) = request
                .params
                .as_ref()
                .and_then(|p| p.get("requestId"))
            {
                let key = StatefulSession::request_key(request_id);
                if let Some((_, token)) = session.pending.remove(&key) {
                    tracing::debug!("cancelling in-flight request {}", key);
                    token.cancel();
                }
            }
            return StatusCode::ACCEPTED.into_response();
        }

        let started = Instant::now();
        let client_name = {
            let mut meta = session.meta.lock().await;
            meta.touch();
            meta.client_info.as_ref().map(|c| c.name.clone())
        };

        // serialize handling within the session
        let _gate = session.gate.lock().await;

        let cancel = session.cancel.child_token();
        let pending_key = request.id.as_ref().map(StatefulSession::request_key);
        if let Some(key) = &pending_key {
            session.pending.insert(key.clone(), cancel.clone());
        }
        // if the caller disappears mid-request, the guard cancels upstream work
        let guard = cancel.clone().drop_guard();

        let progress_sink: Option<ProgressSink> = {
            let out_tx = session.out_tx.clone();
            Some(Arc::new(move |params: rmcp::model::ProgressNotificationParam| {
                let notification = json!({
                    "jsonrpc": rpc::JSONRPC_VERSION,
                    "method": "notifications/progress",
                    "params": serde_json::to_value(&params).unwrap_or_default(),
                });
                if let Err(e) = out_tx.try_send(notification) {
                    tracing::debug!("dropping progress notification: {}", e);
                }
            }))
        };

        let is_gradio_call = rpc::targets_gradio_tool(&request);
        let response = rpc::dispatch(&session.server, &request, progress_sink, cancel.clone()).await;

        guard.disarm();
        if let Some(key) = &pending_key {
            session.pending.remove(key);
        }

        if request.method == "tools/call" {
            self.metrics.record_tool_call(client_name.as_deref());
            if is_gradio_call && rpc::tool_call_failed(&response) {
                self.metrics.record_gradio_failure();
            }
        }

        let is_error = response.as_ref().is_some_and(|r| r.error.is_some());
        self.metrics.record_request(
            &request.method,
            client_name.as_deref(),
            started.elapsed(),
            is_error,
            None,
        );

        match response {
            Some(response) => (StatusCode::OK, Json(response)).into_response(),
            // notifications and cancelled requests get no body
            None => StatusCode::ACCEPTED.into_response(),
        }
    }

    /// Client-to-server responses (pong for keep-alive pings).
    async fn handle_client_response(&self, mcp: &McpHeaders, raw: Value) -> Response {
        let Some(session_id) = mcp.session_id.as_deref() else {
            return StatusCode::ACCEPTED.into_response();
        };
        if let Some(session) = self.sessions.get(session_id).map(|e| e.value().clone()) {
            let is_pong = raw
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| id.starts_with("ping-"));
            if is_pong {
                session.meta.lock().await.record_ping_success();
                session.ping_in_flight.store(false, Ordering::SeqCst);
            }
        }
        StatusCode::ACCEPTED.into_response()
    }

    async fn handle_get(
        State(transport): State<Arc<Self>>,
        uri: Uri,
        headers: HeaderMap,
    ) -> Response {
        let mut headers = headers;
        mcp_headers::promote_query_params(uri.query(), &mut headers);
        let mcp = McpHeaders::from_header_map(&headers);

        if transport.draining.load(Ordering::SeqCst) {
            return Self::draining_response(None);
        }
        // Last-Event-Id is observed but not used for replay
        if let Some(last) = headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
            tracing::debug!("SSE reconnect with Last-Event-Id {}", last);
        }

        let Some(session_id) = mcp.session_id.clone() else {
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
        let Some(session) = transport
            .sessions
            .get(&session_id)
            .map(|e| e.value().clone())
        else {
            transport.metrics.record_session_resume_failed();
            transport.metrics.record_http_error(404);
            return (
                StatusCode::NOT_FOUND,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::SESSION_NOT_FOUND,
                    format!("unknown session: {session_id}"),
                )),
            )
                .into_response();
        };

        let Some(rx) = session.out_rx.lock().await.take() else {
            transport.metrics.record_http_error(409);
            return (
                StatusCode::CONFLICT,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::METHOD_NOT_ALLOWED,
                    "session stream already attached",
                )),
            )
                .into_response();
        };
        session.meta.lock().await.touch();

        let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|message| {
            Ok::<Event, Infallible>(Event::default().data(message.to_string()))
        });
        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(transport.config.heartbeat_interval))
            .into_response()
    }

    async fn handle_delete(
        State(transport): State<Arc<Self>>,
        headers: HeaderMap,
    ) -> Response {
        let mcp = McpHeaders::from_header_map(&headers);
        let Some(session_id) = mcp.session_id.clone() else {
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
        if transport.sessions.contains_key(&session_id) {
            transport.remove_session(&session_id, "explicit delete").await;
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

/// Boot the stateful transport on `bind_addr` with graceful shutdown.
pub async fn boot_streamable_http_server(
    transport: Arc<StreamableHttpTransport>,
    bind_addr: &str,
    lock: hfmcp_base::shutdown::ShutdownLock,
    shutdown_signal: Option<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>>,
) -> anyhow::Result<()> {
    let app = transport.clone().initialize().await;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("MCP streaming HTTP server started on {}", bind_addr);

    let shutdown_future: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
        match shutdown_signal {
            Some(signal) => signal,
            None => {
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
                Box::pin(async move {
                    rx.await.ok();
                })
            }
        };

    let drain = transport.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_future.await;
            drain.shutdown();
        })
        .await?;

    transport.cleanup().await;
    lock.unlock();
    Ok(())
}
