//! Typed extraction of the `x-mcp-*` request header family.
//!
//! Query parameters with the same names (without the prefix) are promoted to
//! headers before extraction, so `?bouquet=search` and `x-mcp-bouquet: search`
//! are equivalent.

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

pub const X_MCP_BOUQUET: &str = "x-mcp-bouquet";
pub const X_MCP_MIX: &str = "x-mcp-mix";
pub const X_MCP_GRADIO: &str = "x-mcp-gradio";
pub const X_MCP_NO_IMAGE_CONTENT: &str = "x-mcp-no-image-content";
pub const X_MCP_JOB_TIMEOUT: &str = "x-mcp-job-timeout";
pub const X_MCP_FORCE_AUTH: &str = "x-mcp-force-auth";
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Query parameter names eligible for promotion, paired with their header.
const PROMOTABLE: &[(&str, &str)] = &[
    ("bouquet", X_MCP_BOUQUET),
    ("mix", X_MCP_MIX),
    ("gradio", X_MCP_GRADIO),
    ("no-image-content", X_MCP_NO_IMAGE_CONTENT),
    ("job-timeout", X_MCP_JOB_TIMEOUT),
    ("force-auth", X_MCP_FORCE_AUTH),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobTimeout {
    Seconds(u64),
    WaitUntilComplete,
}

impl JobTimeout {
    /// Positive integer seconds, or `-1` for wait-until-complete. Anything
    /// else is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<i64>() {
            Ok(-1) => Some(JobTimeout::WaitUntilComplete),
            Ok(n) if n > 0 => Some(JobTimeout::Seconds(n as u64)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct McpHeaders {
    /// Bearer token, already stripped of the `Bearer ` prefix.
    pub token: Option<String>,
    pub bouquet: Option<String>,
    pub mix: Option<String>,
    /// Raw `x-mcp-gradio` value; `none` is the disable sentinel.
    pub gradio: Option<String>,
    pub no_image_content: bool,
    pub job_timeout: Option<JobTimeout>,
    pub force_auth: bool,
    pub session_id: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl McpHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let token = header_str(headers, "authorization")
            .and_then(|auth| auth.strip_prefix("Bearer ").map(str::to_string));
        Self {
            token,
            bouquet: header_str(headers, X_MCP_BOUQUET).map(str::to_string),
            mix: header_str(headers, X_MCP_MIX).map(str::to_string),
            gradio: header_str(headers, X_MCP_GRADIO).map(str::to_string),
            no_image_content: header_str(headers, X_MCP_NO_IMAGE_CONTENT)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            job_timeout: header_str(headers, X_MCP_JOB_TIMEOUT).and_then(JobTimeout::parse),
            force_auth: headers.contains_key(X_MCP_FORCE_AUTH),
            session_id: header_str(headers, SESSION_ID_HEADER).map(str::to_string),
        }
    }
}

/// Promote recognised query parameters to their `x-mcp-*` headers. Existing
/// headers win over query parameters.
pub fn promote_query_params(query: Option<&str>, headers: &mut HeaderMap) {
    let Some(query) = query else { return };
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next().unwrap_or_default();
        let value = kv.next().unwrap_or_default();
        let Some((_, header)) = PROMOTABLE.iter().find(|(q, _)| *q == key) else {
            continue;
        };
        let decoded = percent_decode(value);
        let Ok(name) = HeaderName::from_bytes(header.as_bytes()) else {
            continue;
        };
        if headers.contains_key(&name) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(&decoded) {
            headers.insert(name, value);
        }
    }
}

/// Minimal percent decoding for query values (%2F and friends plus `+`).
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                match hex.and_then(|h| u8::from_str_radix(std::str::from_utf8(h).ok()?, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
