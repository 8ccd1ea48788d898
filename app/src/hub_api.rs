//! Minimal hub API client backing the built-in tools.
//!
//! The tools themselves are thin: each operation returns formatted text for a
//! tool result. Error bodies are truncated before they reach the caller.

use hfmcp_base::error::HfMcpError;
use serde_json::Value;
use std::time::Duration;

use crate::headers::JobTimeout;

/// Upstream response bodies beyond this length are cut before being echoed
/// into error messages, so secrets in upstream errors cannot leak wholesale.
pub const ERROR_BODY_LIMIT: usize = 500;

pub fn truncate_error_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{cut}…")
    }
}

pub struct HubApiClient {
    http: reqwest::Client,
    hub_url: String,
    timeout: Duration,
}

impl HubApiClient {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            hub_url: hub_url.into(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn from_env() -> Self {
        Self::new(hfmcp_base::HF_HUB_URL.clone())
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, HfMcpError> {
        let mut request = self.http.get(url).query(query).timeout(timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HfMcpError::UpstreamError(format!(
                "{url} returned {status}: {}",
                truncate_error_body(&body)
            )));
        }
        Ok(response.json::<Value>().await?)
    }

    pub async fn search(
        &self,
        repo_type: &str,
        query: &str,
        limit: usize,
        token: Option<&str>,
    ) -> Result<String, HfMcpError> {
        let url = format!("{}/api/{}", self.hub_url, repo_type);
        let limit = limit.clamp(1, 50).to_string();
        let body = self
            .get_json(
                &url,
                &[("search", query), ("limit", &limit), ("full", "false")],
                token,
                self.timeout,
            )
            .await?;

        let mut lines = Vec::new();
        if let Some(items) = body.as_array() {
            for item in items {
                let id = item
                    .get("id")
                    .or_else(|| item.get("modelId"))
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>");
                let downloads = item.get("downloads").and_then(Value::as_u64).unwrap_or(0);
                let likes = item.get("likes").and_then(Value::as_u64).unwrap_or(0);
                lines.push(format!("- {id} (downloads: {downloads}, likes: {likes})"));
            }
        }
        if lines.is_empty() {
            return Ok(format!("No {repo_type} matched '{query}'."));
        }
        Ok(format!(
            "Top {repo_type} for '{query}':\n{}",
            lines.join("\n")
        ))
    }

    pub async fn repo_details(
        &self,
        repo_type: &str,
        repo_id: &str,
        include_readme: bool,
        token: Option<&str>,
    ) -> Result<String, HfMcpError> {
        let url = format!("{}/api/{}/{}", self.hub_url, repo_type, repo_id);
        let body = self.get_json(&url, &[], token, self.timeout).await?;
        let mut out = serde_json::to_string_pretty(&body)?;

        if include_readme {
            let readme_url = format!("{}/{}/raw/main/README.md", self.hub_url, repo_id);
            match self.fetch_text(&readme_url, token).await {
                Ok(readme) => {
                    out.push_str("\n\n---\nREADME:\n");
                    out.push_str(&readme);
                }
                Err(e) => {
                    tracing::debug!("README fetch failed for {}: {}", repo_id, e);
                    out.push_str("\n\n(README unavailable)");
                }
            }
        }
        Ok(out)
    }

    pub async fn doc_search(&self, query: &str, product: Option<&str>) -> Result<String, HfMcpError> {
        let url = format!("{}/api/docs/search", self.hub_url);
        let mut params = vec![("q", query)];
        if let Some(product) = product {
            params.push(("product", product));
        }
        let body = self.get_json(&url, &params, None, self.timeout).await?;

        let mut lines = Vec::new();
        if let Some(hits) = body.as_array().or_else(|| body.get("hits").and_then(Value::as_array)) {
            for hit in hits.iter().take(10) {
                let title = hit.get("title").and_then(Value::as_str).unwrap_or("<untitled>");
                let url = hit.get("url").and_then(Value::as_str).unwrap_or("");
                lines.push(format!("- {title}: {url}"));
            }
        }
        if lines.is_empty() {
            return Ok(format!("No documentation matched '{query}'."));
        }
        Ok(lines.join("\n"))
    }

    pub async fn doc_fetch(&self, url: &str) -> Result<String, HfMcpError> {
        if !url.starts_with(&self.hub_url) && !url.starts_with("https://huggingface.co") {
            return Err(HfMcpError::InvalidParameter(format!(
                "refusing to fetch non-documentation url: {url}"
            )));
        }
        self.fetch_text(url, None).await
    }

    pub async fn list_jobs(&self, token: Option<&str>) -> Result<String, HfMcpError> {
        let token = token.ok_or_else(|| {
            HfMcpError::Unauthorized("listing jobs requires authentication".to_string())
        })?;
        let url = format!("{}/api/jobs", self.hub_url);
        let body = self.get_json(&url, &[], Some(token), self.timeout).await?;
        Ok(serde_json::to_string_pretty(&body)?)
    }

    /// Tail a job's logs. The caller-supplied override widens (or removes)
    /// the default timeout.
    pub async fn job_logs(
        &self,
        job_id: &str,
        token: Option<&str>,
        timeout_override: Option<JobTimeout>,
    ) -> Result<String, HfMcpError> {
        let token = token.ok_or_else(|| {
            HfMcpError::Unauthorized("job logs require authentication".to_string())
        })?;
        let timeout = match timeout_override {
            Some(JobTimeout::Seconds(secs)) => Duration::from_secs(secs),
            // wait-until-complete: cap at an hour rather than waiting forever
            Some(JobTimeout::WaitUntilComplete) => Duration::from_secs(3600),
            None => self.timeout,
        };
        let url = format!("{}/api/jobs/{}/logs", self.hub_url, job_id);
        let request = self.http.get(&url).bearer_auth(token).timeout(timeout);
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HfMcpError::UpstreamError(format!(
                "job logs returned {status}: {}",
                truncate_error_body(&body)
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_text(&self, url: &str, token: Option<&str>) -> Result<String, HfMcpError> {
        let mut request = self.http.get(url).timeout(self.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HfMcpError::UpstreamError(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_body() {
        assert_eq!(truncate_error_body("short"), "short");
        let long = "x".repeat(900);
        let truncated = truncate_error_body(&long);
        assert!(truncated.chars().count() == ERROR_BODY_LIMIT + 1);
        assert!(truncated.ends_with('…'));
    }
}
