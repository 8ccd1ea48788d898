//! Built-in tool catalog.
//!
//! Descriptors are precomputed once at process start; the per-request factory
//! only wires enable/disable flags, which keeps scoped-server construction on
//! the stateless hot path cheap.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

pub const HUB_SEARCH: &str = "hub_search";
pub const HUB_INSPECT: &str = "hub_inspect";
pub const HF_DOC_SEARCH: &str = "hf_doc_search";
pub const HF_DOC_FETCH: &str = "hf_doc_fetch";
pub const HUB_JOBS: &str = "hub_jobs";
pub const USE_SPACE: &str = "use_space";
pub const DYNAMIC_SPACE: &str = "dynamic_space";

/// Marker id: when present in a selection, `hub_inspect` exposes its
/// `include_readme` flag. Not a tool.
pub const README_MARKER: &str = "hub_inspect_readme";
/// Marker id: when present in a selection, image blocks are stripped from
/// Gradio results. Not a tool.
pub const NO_IMAGE_MARKER: &str = "no_image_content";

/// Clients whose resource surface must be advertised even though the gateway
/// serves an empty resource list.
pub const RESOURCE_CLIENT_NAMES: &[&str] = &["claude-ai"];

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub id: &'static str,
    pub description: &'static str,
    base_schema: Value,
}

impl ToolSpec {
    fn new(id: &'static str, description: &'static str, base_schema: Value) -> Self {
        Self {
            id,
            description,
            base_schema,
        }
    }

    /// Input schema for this tool. `hub_inspect` grows an `include_readme`
    /// flag when the README marker is part of the selection.
    pub fn input_schema(&self, include_readme: bool) -> Value {
        let mut schema = self.base_schema.clone();
        if self.id == HUB_INSPECT && include_readme {
            schema["properties"]["include_readme"] = json!({
                "type": "boolean",
                "description": "Also return the repository README body",
                "default": false
            });
        }
        schema
    }
}

pub static BUILTIN_TOOLS: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    vec![
        ToolSpec::new(
            HUB_SEARCH,
            "Search models, datasets and spaces on the Hugging Face Hub",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Free-text search query"},
                    "repo_type": {
                        "type": "string",
                        "enum": ["models", "datasets", "spaces"],
                        "default": "models"
                    },
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            HUB_INSPECT,
            "Inspect a hub repository: metadata, tags, downloads",
            json!({
                "type": "object",
                "properties": {
                    "repo_id": {"type": "string", "description": "owner/name identifier"},
                    "repo_type": {
                        "type": "string",
                        "enum": ["models", "datasets", "spaces"],
                        "default": "models"
                    }
                },
                "required": ["repo_id"]
            }),
        ),
        ToolSpec::new(
            HF_DOC_SEARCH,
            "Search the Hugging Face documentation",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "product": {"type": "string", "description": "Restrict to one product, e.g. transformers"}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            HF_DOC_FETCH,
            "Fetch a documentation page as markdown",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Documentation page URL"}
                },
                "required": ["url"]
            }),
        ),
        ToolSpec::new(
            HUB_JOBS,
            "List your compute jobs and tail their logs",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "logs"], "default": "list"},
                    "job_id": {"type": "string"}
                }
            }),
        ),
        ToolSpec::new(
            USE_SPACE,
            "Invoke a tool on one of your configured Gradio spaces",
            json!({
                "type": "object",
                "properties": {
                    "tool_name": {"type": "string", "description": "Outward tool name, e.g. gr1_infer"},
                    "arguments": {"type": "object"}
                },
                "required": ["tool_name"]
            }),
        ),
        ToolSpec::new(
            DYNAMIC_SPACE,
            "Discover an arbitrary Gradio space and invoke one of its tools",
            json!({
                "type": "object",
                "properties": {
                    "space_id": {"type": "string", "description": "owner/name identifier"},
                    "tool_name": {"type": "string", "description": "Upstream tool name; omit to list tools"},
                    "arguments": {"type": "object"}
                },
                "required": ["space_id"]
            }),
        ),
    ]
});

pub fn is_marker(id: &str) -> bool {
    id == README_MARKER || id == NO_IMAGE_MARKER
}

pub fn all_tool_ids() -> Vec<&'static str> {
    BUILTIN_TOOLS.iter().map(|t| t.id).collect()
}

pub fn find_tool(id: &str) -> Option<&'static ToolSpec> {
    BUILTIN_TOOLS.iter().find(|t| t.id == id)
}
