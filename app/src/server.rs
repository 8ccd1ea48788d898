//! The scoped gateway server: one instance per logical connection (stateful)
//! or per request (stateless).
//!
//! Built-in tools dispatch to the hub API client; `gr*`-named tools route
//! through space discovery and the per-call upstream proxy, with response
//! post-processing applied before the result reaches the transport.

use rmcp::model::{CallToolResult, Content, ProgressToken, Tool};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hfmcp_base::error::HfMcpError;
use hfmcp_gradio::discovery::DiscoveryOptions;
use hfmcp_gradio::postprocess;
use hfmcp_gradio::projection;
use hfmcp_gradio::space_id::SpaceId;
use hfmcp_gradio::{naming, SpaceDiscovery, SpaceToolUpstream};

use crate::auth::{AuthOutcome, UserIdentity};
use crate::catalog::{
    self, DYNAMIC_SPACE, HF_DOC_FETCH, HF_DOC_SEARCH, HUB_INSPECT, HUB_JOBS, HUB_SEARCH,
    RESOURCE_CLIENT_NAMES, USE_SPACE,
};
use crate::factory::RequestScope;
use crate::headers::JobTimeout;
use crate::hub_api::{truncate_error_body, HubApiClient};
use crate::selection::SelectionResult;

/// A discovered space tool registered under its synthesized outward name.
#[derive(Debug, Clone)]
pub struct RegisteredSpaceTool {
    pub outward_name: String,
    pub space: SpaceId,
    pub subdomain: String,
    pub private: bool,
    pub upstream_name: String,
    pub description: Option<String>,
    /// Already projected to the supported outward shape.
    pub input_schema: Value,
}

pub struct GatewayServer {
    selection: SelectionResult,
    enabled: HashSet<String>,
    token: Option<String>,
    identity: Option<UserIdentity>,
    authenticated: bool,
    client_name: Option<String>,
    include_readme: bool,
    strip_images: bool,
    skip_gradio: bool,
    job_timeout: Option<JobTimeout>,
    discovery: Arc<SpaceDiscovery>,
    upstream: Arc<SpaceToolUpstream>,
    hub_api: Arc<HubApiClient>,
    http: reqwest::Client,
}

impl GatewayServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        selection: SelectionResult,
        scope: RequestScope,
        auth: AuthOutcome,
        include_readme: bool,
        strip_images: bool,
        skip_gradio: bool,
        discovery: Arc<SpaceDiscovery>,
        upstream: Arc<SpaceToolUpstream>,
        hub_api: Arc<HubApiClient>,
    ) -> Self {
        let enabled = selection
            .enabled_tool_ids
            .iter()
            .filter(|id| !catalog::is_marker(id))
            .cloned()
            .collect();
        Self {
            enabled,
            selection,
            token: scope.headers.token.clone(),
            identity: auth.identity().cloned(),
            authenticated: auth.is_authenticated(),
            client_name: scope.client.as_ref().map(|c| c.name.clone()),
            include_readme,
            strip_images,
            skip_gradio,
            job_timeout: scope.headers.job_timeout,
            discovery,
            upstream,
            hub_api,
            http: reqwest::Client::new(),
        }
    }

    pub fn selection(&self) -> &SelectionResult {
        &self.selection
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn instructions(&self) -> String {
        match &self.identity {
            Some(identity) => format!(
                "Hugging Face MCP gateway. Authenticated as {}. Use hub_search to find \
                 models, datasets and spaces; gr*-prefixed tools proxy your configured \
                 Gradio spaces.",
                identity.username
            ),
            None => "Hugging Face MCP gateway. Anonymous access: public resources only. \
                     Send `Authorization: Bearer <hf_token>` to reach private resources \
                     and your saved settings."
                .to_string(),
        }
    }

    /// Capability set advertised on initialize. Tools always change with the
    /// selection; the resource surface exists only for clients that require
    /// it. No completions capability is ever advertised.
    pub fn capabilities(&self) -> Value {
        let mut caps = json!({
            "tools": {"listChanged": true},
            "prompts": {"listChanged": false}
        });
        if self.is_resource_capable_client() {
            caps["resources"] = json!({"listChanged": false});
        }
        caps
    }

    fn is_resource_capable_client(&self) -> bool {
        self.client_name
            .as_deref()
            .is_some_and(|name| RESOURCE_CLIENT_NAMES.contains(&name))
    }

    pub async fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = catalog::BUILTIN_TOOLS
            .iter()
            .filter(|spec| self.enabled.contains(spec.id))
            .map(|spec| {
                to_rmcp_tool(
                    spec.id.to_string(),
                    Some(spec.description.to_string()),
                    spec.input_schema(self.include_readme),
                )
            })
            .collect();

        if !self.skip_gradio {
            for registered in self.resolve_gradio().await {
                tools.push(to_rmcp_tool(
                    registered.outward_name,
                    registered.description,
                    registered.input_schema,
                ));
            }
        }
        tools
    }

    /// Dispatch a tool call. Unknown or disabled tools are protocol errors;
    /// execution failures come back as `isError` tool results.
    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        progress: Option<(ProgressToken, hfmcp_gradio::ProgressSink)>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, HfMcpError> {
        if naming::is_gradio_tool_name(name) {
            return self.call_gradio(name, args, progress, cancel).await;
        }
        if !self.enabled.contains(name) {
            return Err(HfMcpError::NotFound(format!("unknown tool: {name}")));
        }
        match name {
            HUB_SEARCH => self.run_hub_search(&args).await,
            HUB_INSPECT => self.run_hub_inspect(&args).await,
            HF_DOC_SEARCH => self.run_doc_search(&args).await,
            HF_DOC_FETCH => self.run_doc_fetch(&args).await,
            HUB_JOBS => self.run_jobs(&args).await,
            USE_SPACE => {
                let tool_name = require_str(&args, "tool_name")?;
                let arguments = args.get("arguments").cloned().unwrap_or(json!({}));
                self.call_gradio(&tool_name, arguments, progress, cancel)
                    .await
            }
            DYNAMIC_SPACE => self.run_dynamic_space(&args, progress, cancel).await,
            other => Err(HfMcpError::NotFound(format!("unknown tool: {other}"))),
        }
    }

    /// Resolve the scoped Gradio endpoints into registered outward tools.
    pub async fn resolve_gradio(&self) -> Vec<RegisteredSpaceTool> {
        if self.selection.gradio_spaces.is_empty() {
            return Vec::new();
        }
        let spaces = self
            .discovery
            .resolve_spaces(
                &self.selection.gradio_spaces,
                self.token.as_deref(),
                &DiscoveryOptions::default(),
            )
            .await;

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for (space_index, space) in spaces.into_iter().enumerate() {
            for (tool_index, tool) in space.tools.iter().enumerate() {
                let mut outward_name = naming::outward_tool_name(
                    space.metadata.private,
                    space_index + 1,
                    tool_index,
                    &tool.name,
                );
                // sanitization can merge distinct upstream names; keep the
                // outward surface collision-free within one discovery
                if !seen.insert(outward_name.clone()) {
                    let suffix = format!("_{tool_index}");
                    outward_name
                        .truncate(naming::MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()));
                    outward_name.push_str(&suffix);
                    seen.insert(outward_name.clone());
                }
                out.push(RegisteredSpaceTool {
                    outward_name,
                    space: space.id.clone(),
                    subdomain: space.metadata.subdomain.clone(),
                    private: space.metadata.private,
                    upstream_name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: projection::project_input_schema(&tool.input_schema),
                });
            }
        }
        out
    }

    async fn call_gradio(
        &self,
        name: &str,
        args: Value,
        progress: Option<(ProgressToken, hfmcp_gradio::ProgressSink)>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, HfMcpError> {
        let registered = self.resolve_gradio().await;
        let Some(tool) = registered.into_iter().find(|t| t.outward_name == name) else {
            return Err(HfMcpError::NotFound(format!("unknown tool: {name}")));
        };

        let outcome = self
            .upstream
            .call_space_tool(
                &tool.subdomain,
                tool.private,
                self.token.as_deref(),
                &tool.upstream_name,
                args,
                progress,
                cancel,
            )
            .await;

        match outcome {
            Ok(mut result) => {
                self.postprocess(&mut result, name, &tool.space.key()).await;
                Ok(result)
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => Ok(error_result(&e.to_string())),
        }
    }

    async fn postprocess(&self, result: &mut CallToolResult, tool_name: &str, space_name: &str) {
        if self.strip_images {
            postprocess::strip_image_content(result);
        }
        if self.client_name.as_deref() == Some(postprocess::OPENAI_CLIENT_NAME) {
            postprocess::attach_url_structured_content(result, space_name);
        }
        postprocess::embed_mcpui_audio(result, tool_name, &self.http).await;
    }

    async fn run_hub_search(&self, args: &Value) -> Result<CallToolResult, HfMcpError> {
        let query = require_str(args, "query")?;
        let repo_type = optional_str(args, "repo_type").unwrap_or_else(|| "models".to_string());
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        Ok(text_or_error(
            self.hub_api
                .search(&repo_type, &query, limit, self.token.as_deref())
                .await,
        ))
    }

    async fn run_hub_inspect(&self, args: &Value) -> Result<CallToolResult, HfMcpError> {
        let repo_id = require_str(args, "repo_id")?;
        let repo_type = optional_str(args, "repo_type").unwrap_or_else(|| "models".to_string());
        // the flag is honored only when the selection exposed it
        let include_readme = self.include_readme
            && args
                .get("include_readme")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        Ok(text_or_error(
            self.hub_api
                .repo_details(&repo_type, &repo_id, include_readme, self.token.as_deref())
                .await,
        ))
    }

    async fn run_doc_search(&self, args: &Value) -> Result<CallToolResult, HfMcpError> {
        let query = require_str(args, "query")?;
        let product = optional_str(args, "product");
        Ok(text_or_error(
            self.hub_api.doc_search(&query, product.as_deref()).await,
        ))
    }

    async fn run_doc_fetch(&self, args: &Value) -> Result<CallToolResult, HfMcpError> {
        let url = require_str(args, "url")?;
        Ok(text_or_error(self.hub_api.doc_fetch(&url).await))
    }

    async fn run_jobs(&self, args: &Value) -> Result<CallToolResult, HfMcpError> {
        let action = optional_str(args, "action").unwrap_or_else(|| "list".to_string());
        let outcome = match action.as_str() {
            "logs" => {
                let job_id = require_str(args, "job_id")?;
                self.hub_api
                    .job_logs(&job_id, self.token.as_deref(), self.job_timeout)
                    .await
            }
            _ => self.hub_api.list_jobs(self.token.as_deref()).await,
        };
        Ok(text_or_error(outcome))
    }

    async fn run_dynamic_space(
        &self,
        args: &Value,
        progress: Option<(ProgressToken, hfmcp_gradio::ProgressSink)>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, HfMcpError> {
        let raw_id = require_str(args, "space_id")?;
        let Some(space_id) = SpaceId::parse(&raw_id) else {
            return Err(HfMcpError::InvalidParameter(format!(
                "invalid space id: {raw_id}"
            )));
        };

        let spaces = self
            .discovery
            .resolve_spaces(
                std::slice::from_ref(&space_id),
                self.token.as_deref(),
                &DiscoveryOptions::default(),
            )
            .await;
        let Some(space) = spaces.into_iter().next() else {
            return Ok(error_result(&format!(
                "space {space_id} is not reachable or is not a Gradio space"
            )));
        };

        let Some(tool_name) = optional_str(args, "tool_name") else {
            let listing = space
                .tools
                .iter()
                .map(|t| {
                    format!(
                        "- {}: {}",
                        t.name,
                        t.description.as_deref().unwrap_or("(no description)")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "Tools on {space_id}:\n{listing}"
            ))]));
        };

        if !space.tools.iter().any(|t| t.name == tool_name) {
            return Ok(error_result(&format!(
                "space {space_id} has no tool named '{tool_name}'"
            )));
        }

        let arguments = args.get("arguments").cloned().unwrap_or(json!({}));
        let outcome = self
            .upstream
            .call_space_tool(
                &space.metadata.subdomain,
                space.metadata.private,
                self.token.as_deref(),
                &tool_name,
                arguments,
                progress,
                cancel,
            )
            .await;

        match outcome {
            Ok(mut result) => {
                self.postprocess(&mut result, &tool_name, &space_id.key()).await;
                Ok(result)
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => Ok(error_result(&e.to_string())),
        }
    }
}

fn to_rmcp_tool(name: String, description: Option<String>, schema: Value) -> Tool {
    let object = schema.as_object().cloned().unwrap_or_default();
    Tool::new(
        Cow::Owned(name),
        Cow::Owned(description.unwrap_or_default()),
        Arc::new(object),
    )
}

fn error_result(message: &str) -> CallToolResult {
    CallToolResult::error(vec![Content::text(truncate_error_body(message))])
}

fn text_or_error(outcome: Result<String, HfMcpError>) -> CallToolResult {
    match outcome {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => error_result(&e.to_string()),
    }
}

fn require_str(args: &Value, key: &str) -> Result<String, HfMcpError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HfMcpError::InvalidParameter(format!("missing required argument: {key}")))
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}
