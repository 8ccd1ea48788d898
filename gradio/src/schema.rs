//! Tool schema fetching and normalization.
//!
//! Spaces publish their tool surface at
//! `https://{subdomain}.hf.space/gradio_api/mcp/schema` in one of two shapes:
//! an array of `{name, description?, inputSchema}` objects, or an object
//! mapping tool names to input schemas (with the description inline on the
//! schema). Both are normalized at ingest so downstream consumers never
//! branch on form.

use async_trait::async_trait;
use hfmcp_base::error::HfMcpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Header used to forward the caller's token to private spaces. Kept separate
/// from `Authorization` so the space cannot see hub credentials it should not.
pub const HF_AUTH_HEADER: &str = "X-HF-Authorization";

/// Gradio emits internal lambda endpoints into the schema; they are not
/// callable tools.
const LAMBDA_MARKER: &str = "<lambda";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Normalize either schema document form into tool descriptors, dropping
/// Gradio lambda artifacts.
pub fn parse_schema_document(doc: &Value) -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    match doc {
        Value::Array(items) => {
            for item in items {
                let Some(name) = item.get("name").and_then(Value::as_str) else {
                    tracing::warn!("schema array entry without a name, skipping");
                    continue;
                };
                tools.push(ToolDescriptor {
                    name: name.to_string(),
                    description: item
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    input_schema: item
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                });
            }
        }
        Value::Object(map) => {
            for (name, schema) in map {
                tools.push(ToolDescriptor {
                    name: name.clone(),
                    description: schema
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    input_schema: schema.clone(),
                });
            }
        }
        other => {
            tracing::warn!("unexpected schema document shape: {}", other);
        }
    }
    tools.retain(|t| !t.name.contains(LAMBDA_MARKER));
    tools
}

#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch_schema(
        &self,
        subdomain: &str,
        private: bool,
        token: Option<&str>,
    ) -> Result<Vec<ToolDescriptor>, HfMcpError>;
}

pub struct SpaceSchemaClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl SpaceSchemaClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl SchemaFetcher for SpaceSchemaClient {
    async fn fetch_schema(
        &self,
        subdomain: &str,
        private: bool,
        token: Option<&str>,
    ) -> Result<Vec<ToolDescriptor>, HfMcpError> {
        let url = format!("https://{subdomain}.hf.space/gradio_api/mcp/schema");
        let mut request = self.http.get(&url).timeout(self.timeout);
        if private {
            if let Some(token) = token {
                request = request.header(HF_AUTH_HEADER, format!("Bearer {token}"));
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HfMcpError::UpstreamError(format!(
                "schema fetch failed for {subdomain}: status {}",
                response.status()
            )));
        }
        let doc = response.json::<Value>().await?;
        Ok(parse_schema_document(&doc))
    }
}
