//! Space metadata fetching against the hub API.

use async_trait::async_trait;
use hfmcp_base::error::HfMcpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::space_id::SpaceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRuntime {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub hardware: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceMetadata {
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(default)]
    pub runtime: Option<SpaceRuntime>,
}

impl SpaceMetadata {
    /// Only spaces running the gradio SDK with a reachable subdomain can be
    /// proxied.
    pub fn is_proxyable(&self) -> bool {
        self.sdk.as_deref() == Some("gradio") && !self.subdomain.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum SpaceInfoResponse {
    /// 304 — the cached entry is still current.
    NotModified,
    Fresh {
        metadata: SpaceMetadata,
        etag: Option<String>,
    },
}

#[async_trait]
pub trait SpaceInfoFetcher: Send + Sync {
    async fn fetch_space_info(
        &self,
        id: &SpaceId,
        etag: Option<&str>,
        token: Option<&str>,
    ) -> Result<SpaceInfoResponse, HfMcpError>;
}

pub struct HubSpaceClient {
    http: reqwest::Client,
    hub_url: String,
    timeout: Duration,
}

impl HubSpaceClient {
    pub fn new(hub_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            hub_url: hub_url.into(),
            timeout,
        }
    }

    pub fn from_env(timeout: Duration) -> Self {
        Self::new(hfmcp_base::HF_HUB_URL.clone(), timeout)
    }
}

#[async_trait]
impl SpaceInfoFetcher for HubSpaceClient {
    async fn fetch_space_info(
        &self,
        id: &SpaceId,
        etag: Option<&str>,
        token: Option<&str>,
    ) -> Result<SpaceInfoResponse, HfMcpError> {
        let url = format!("{}/api/spaces/{}/{}", self.hub_url, id.owner, id.name);
        let mut request = self.http.get(&url).timeout(self.timeout);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(SpaceInfoResponse::NotModified);
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(HfMcpError::NotFound(format!("space not found: {id}")));
        }
        if !response.status().is_success() {
            return Err(HfMcpError::UpstreamError(format!(
                "space metadata fetch failed for {id}: status {}",
                response.status()
            )));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let metadata = response.json::<SpaceMetadata>().await?;
        Ok(SpaceInfoResponse::Fresh { metadata, etag })
    }
}
