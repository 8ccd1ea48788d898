//! HTTP-level integration tests for both transports: session lifecycle,
//! the shared protocol error vocabulary, the authorization gate and the
//! stateless stub fast-path.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use hfmcp_app::settings::{ResolvedSettings, SettingsProvider};
use hfmcp_app::{ServerFactory, TokenValidator, UserIdentity};
use hfmcp_base::error::HfMcpError;
use hfmcp_gradio::hub::{SpaceInfoFetcher, SpaceInfoResponse};
use hfmcp_gradio::schema::{SchemaFetcher, ToolDescriptor};
use hfmcp_gradio::{DiscoveryConfig, SpaceDiscovery, SpaceId, SpaceToolUpstream};
use mcp_server::{StatelessTransport, StreamableHttpTransport, TransportConfig};

struct EmptyHub;

#[async_trait]
impl SpaceInfoFetcher for EmptyHub {
    async fn fetch_space_info(
        &self,
        id: &SpaceId,
        _etag: Option<&str>,
        _token: Option<&str>,
    ) -> Result<SpaceInfoResponse, HfMcpError> {
        Err(HfMcpError::NotFound(id.key()))
    }
}

#[async_trait]
impl SchemaFetcher for EmptyHub {
    async fn fetch_schema(
        &self,
        subdomain: &str,
        _private: bool,
        _token: Option<&str>,
    ) -> Result<Vec<ToolDescriptor>, HfMcpError> {
        Err(HfMcpError::NotFound(subdomain.to_string()))
    }
}

struct NoSettings;

#[async_trait]
impl SettingsProvider for NoSettings {
    async fn settings_for(
        &self,
        _identity: Option<&UserIdentity>,
    ) -> Result<Option<ResolvedSettings>, HfMcpError> {
        Ok(None)
    }
}

struct RejectAll;

#[async_trait]
impl TokenValidator for RejectAll {
    async fn validate(&self, _token: &str) -> Result<UserIdentity, HfMcpError> {
        Err(HfMcpError::Unauthorized("test".to_string()))
    }
}

fn test_factory() -> Arc<ServerFactory> {
    let discovery = Arc::new(SpaceDiscovery::new(
        Arc::new(EmptyHub),
        Arc::new(EmptyHub),
        DiscoveryConfig::default(),
    ));
    Arc::new(ServerFactory::new(
        discovery,
        Arc::new(SpaceToolUpstream::new(std::time::Duration::from_secs(5))),
        Arc::new(hfmcp_app::hub_api::HubApiClient::new("https://hub.invalid")),
        Arc::new(NoSettings),
        Arc::new(RejectAll),
        false,
    ))
}

fn stateful() -> (Arc<StreamableHttpTransport>, Router) {
    let transport = StreamableHttpTransport::new(test_factory(), TransportConfig::default());
    let router = transport.clone().router();
    (transport, router)
}

fn stateless(analytics: bool) -> (Arc<StatelessTransport>, Router) {
    let config = TransportConfig {
        analytics_mode: analytics,
        ..TransportConfig::default()
    };
    let transport = StatelessTransport::new(test_factory(), config);
    let router = transport.clone().router();
    (transport, router)
}

fn post(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_with_session(body: Value, session_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("mcp-session-id", session_id)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "clientInfo": {"name": "test-client", "version": "1.0"},
            "capabilities": {}
        }
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_stateful_initialize_creates_session() {
    let (transport, router) = stateful();

    let response = router.oneshot(post(initialize_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("session id header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());

    let body = body_json(response).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "hfmcp");

    assert_eq!(transport.get_active_connection_count(), 1);
    let sessions = transport.get_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].client_info.as_ref().unwrap().name, "test-client");
}

#[tokio::test]
async fn test_stateful_request_without_session_is_invalid_params() {
    let (_transport, router) = stateful();

    let response = router
        .oneshot(post(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["id"], 2);
}

#[tokio::test]
async fn test_stateful_unknown_session_is_session_not_found() {
    let (transport, router) = stateful();

    let response = router
        .oneshot(post_with_session(
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
            "no-such-session",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(transport.get_metrics().sessions_resume_failed, 1);
}

#[tokio::test]
async fn test_stateful_session_roundtrip_and_delete() {
    let (transport, router) = stateful();

    let response = router
        .clone()
        .oneshot(post(initialize_body()))
        .await
        .unwrap();
    let session_id = response.headers()["mcp-session-id"]
        .to_str()
        .unwrap()
        .to_string();

    let response = router
        .clone()
        .oneshot(post_with_session(
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}),
            &session_id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["result"]["tools"].is_array());

    let delete = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.get_active_connection_count(), 0);

    // the session is gone for subsequent requests
    let response = router
        .oneshot(post_with_session(
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}),
            &session_id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stateful_draining_rejects_with_shutdown_code() {
    let (transport, router) = stateful();
    transport.shutdown();

    let response = router.oneshot(post(initialize_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32000);
}

#[tokio::test]
async fn test_invalid_token_is_rejected_with_oauth_hint() {
    let (_transport, router) = stateful();

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("authorization", "Bearer obviously-bad")
        .body(Body::from(initialize_body().to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("OAuth-Protected-Resource"));
}

#[tokio::test]
async fn test_force_auth_rejects_anonymous() {
    let (_transport, router) = stateless(false);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("x-mcp-force-auth", "1")
        .body(Body::from(initialize_body().to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stateless_initialize_without_analytics_has_no_session() {
    let (_transport, router) = stateless(false);

    let response = router.oneshot(post(initialize_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("mcp-session-id").is_none());
}

#[tokio::test]
async fn test_stateless_analytics_assigns_and_deletes_sessions() {
    let (transport, router) = stateless(true);

    let response = router
        .clone()
        .oneshot(post(initialize_body()))
        .await
        .unwrap();
    let session_id = response.headers()["mcp-session-id"]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(transport.get_sessions().await.len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(transport.get_sessions().await.is_empty());
}

#[tokio::test]
async fn test_stateless_delete_rejected_outside_analytics_mode() {
    let (_transport, router) = stateless(false);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", "whatever")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_stateless_stub_fast_path_answers_bookkeeping() {
    let (_transport, router) = stateless(false);

    let response = router
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"], json!({}));

    let response = router
        .oneshot(post(
            json!({"jsonrpc": "2.0", "id": 8, "method": "resources/list"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"]["resources"], json!([]));
}

#[tokio::test]
async fn test_stateless_welcome_page_on_get() {
    let (_transport, router) = stateless(false);

    let request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_management_surface_reports_metrics() {
    let (_transport, router) = stateless(false);

    router
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})))
        .await
        .unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/api/metrics")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["requests_total"], 1);
    assert!(body["methods"]["ping"]["count"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_query_parameters_promote_to_headers() {
    let (_transport, router) = stateful();

    // a bouquet passed as a query parameter must shape the session
    let request = Request::builder()
        .method("POST")
        .uri("/mcp?bouquet=nothing")
        .header("content-type", "application/json")
        .body(Body::from(initialize_body().to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let session_id = response.headers()["mcp-session-id"]
        .to_str()
        .unwrap()
        .to_string();

    let response = router
        .oneshot(post_with_session(
            json!({"jsonrpc": "2.0", "id": 10, "method": "tools/list"}),
            &session_id,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"]["tools"], json!([]));
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let (_transport, router) = stateless(false);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}
