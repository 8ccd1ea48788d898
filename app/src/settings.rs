//! User settings resolution.
//!
//! Settings come either from an external settings API (keyed by the caller's
//! identity) or from a local TOML file; absent settings make the selection
//! strategy fall through to its default.

use async_trait::async_trait;
use hfmcp_base::error::HfMcpError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::UserIdentity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Enabled built-in tool ids, in the user's order.
    #[serde(default)]
    pub built_in_tools: Vec<String>,
    /// Gradio endpoints (`owner/name`) configured by the user.
    #[serde(default)]
    pub gradio: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    /// External settings API.
    External,
    /// Local file.
    Internal,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub settings: UserSettings,
    pub source: SettingsSource,
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings_for(
        &self,
        identity: Option<&UserIdentity>,
    ) -> Result<Option<ResolvedSettings>, HfMcpError>;
}

/// No settings configured; selection always falls through.
pub struct NoSettings;

#[async_trait]
impl SettingsProvider for NoSettings {
    async fn settings_for(
        &self,
        _identity: Option<&UserIdentity>,
    ) -> Result<Option<ResolvedSettings>, HfMcpError> {
        Ok(None)
    }
}

/// Settings from a local TOML file; the same settings apply to every caller.
pub struct FileSettingsProvider {
    path: String,
}

impl FileSettingsProvider {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<UserSettings, HfMcpError> {
        let content = tokio::fs::read_to_string(Path::new(&self.path))
            .await
            .map_err(|e| HfMcpError::NotFound(format!("settings file {}: {}", self.path, e)))?;
        toml::from_str(&content).map_err(|e| HfMcpError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl SettingsProvider for FileSettingsProvider {
    async fn settings_for(
        &self,
        _identity: Option<&UserIdentity>,
    ) -> Result<Option<ResolvedSettings>, HfMcpError> {
        match self.load().await {
            Ok(settings) => Ok(Some(ResolvedSettings {
                settings,
                source: SettingsSource::Internal,
            })),
            Err(e) => {
                tracing::debug!("local settings unavailable: {}", e);
                Ok(None)
            }
        }
    }
}

/// Settings fetched from an external settings API. Anonymous callers have no
/// settings there.
pub struct ExternalSettingsProvider {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ExternalSettingsProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl SettingsProvider for ExternalSettingsProvider {
    async fn settings_for(
        &self,
        identity: Option<&UserIdentity>,
    ) -> Result<Option<ResolvedSettings>, HfMcpError> {
        let Some(identity) = identity else {
            return Ok(None);
        };
        let response = self
            .http
            .get(&self.url)
            .query(&[("user", identity.username.as_str())])
            .timeout(self.timeout)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(HfMcpError::UpstreamError(format!(
                "settings API returned {}",
                response.status()
            )));
        }
        let settings = response.json::<UserSettings>().await?;
        Ok(Some(ResolvedSettings {
            settings,
            source: SettingsSource::External,
        }))
    }
}

/// Provider wiring: `USER_SETTINGS_URL` wins over `USER_SETTINGS_FILE`.
pub fn settings_provider_from_env() -> Arc<dyn SettingsProvider> {
    if let Ok(url) = std::env::var("USER_SETTINGS_URL") {
        return Arc::new(ExternalSettingsProvider::new(url));
    }
    if let Some(path) = hfmcp_base::USER_SETTINGS_FILE.clone() {
        return Arc::new(FileSettingsProvider::new(path));
    }
    Arc::new(NoSettings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_file_settings_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            built_in_tools = ["hub_search", "hf_doc_search"]
            gradio = ["acme/foo", "other/bar"]
            "#
        )
        .unwrap();
        file.flush().unwrap();

        let provider = FileSettingsProvider::new(file.path().to_str().unwrap());
        let resolved = provider.settings_for(None).await.unwrap().unwrap();
        assert_eq!(resolved.source, SettingsSource::Internal);
        assert_eq!(
            resolved.settings.built_in_tools,
            vec!["hub_search", "hf_doc_search"]
        );
        assert_eq!(resolved.settings.gradio, vec!["acme/foo", "other/bar"]);
    }

    #[tokio::test]
    async fn test_missing_file_falls_through() {
        let provider = FileSettingsProvider::new("/nonexistent/settings.toml");
        assert!(provider.settings_for(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_settings_provider() {
        assert!(NoSettings.settings_for(None).await.unwrap().is_none());
    }

    #[test]
    fn test_settings_defaults() {
        let settings: UserSettings = toml::from_str("").unwrap();
        assert!(settings.built_in_tools.is_empty());
        assert!(settings.gradio.is_empty());
    }
}
