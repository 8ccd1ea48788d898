//! Token validation against the hub.
//!
//! The hub is an opaque collaborator here: `validate(token)` either yields an
//! identity or an unauthorized error. Network trouble while validating must
//! not be conflated with an invalid token — such requests continue
//! unauthenticated.

use async_trait::async_trait;
use hfmcp_base::error::HfMcpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header returned with 401 responses so OAuth-capable clients can discover
/// the protected-resource metadata.
pub const OAUTH_RESOURCE_HEADER: &str = "OAuth-Protected-Resource";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(rename = "name")]
    pub username: String,
    #[serde(default)]
    pub fullname: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// No token supplied.
    Anonymous,
    Authenticated(UserIdentity),
    /// The validator positively rejected the token.
    InvalidToken,
    /// The validator could not be reached; treated as anonymous.
    ValidatorUnavailable,
}

impl AuthOutcome {
    pub fn identity(&self) -> Option<&UserIdentity> {
        match self {
            AuthOutcome::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `Err(Unauthorized)` means the token was positively rejected; any other
    /// error means the validator itself failed.
    async fn validate(&self, token: &str) -> Result<UserIdentity, HfMcpError>;
}

pub struct HubTokenValidator {
    http: reqwest::Client,
    hub_url: String,
    timeout: Duration,
}

impl HubTokenValidator {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            hub_url: hub_url.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn from_env() -> Self {
        Self::new(hfmcp_base::HF_HUB_URL.clone())
    }

    /// OAuth discovery hint attached to 401 responses.
    pub fn oauth_hint(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.hub_url)
    }
}

#[async_trait]
impl TokenValidator for HubTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserIdentity, HfMcpError> {
        let response = self
            .http
            .get(format!("{}/api/whoami-v2", self.hub_url))
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(HfMcpError::Unauthorized("token rejected by hub".to_string()));
        }
        if !response.status().is_success() {
            return Err(HfMcpError::UpstreamError(format!(
                "whoami returned {}",
                response.status()
            )));
        }
        Ok(response.json::<UserIdentity>().await?)
    }
}

/// Evaluate an optional token into an [`AuthOutcome`] per the gateway's
/// authorization policy.
pub async fn evaluate_token(
    validator: &dyn TokenValidator,
    token: Option<&str>,
) -> AuthOutcome {
    let Some(token) = token else {
        return AuthOutcome::Anonymous;
    };
    match validator.validate(token).await {
        Ok(identity) => AuthOutcome::Authenticated(identity),
        Err(HfMcpError::Unauthorized(_)) => AuthOutcome::InvalidToken,
        Err(e) => {
            tracing::warn!("token validator unavailable, continuing anonymously: {}", e);
            AuthOutcome::ValidatorUnavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeValidator {
        behavior: &'static str,
    }

    #[async_trait]
    impl TokenValidator for FakeValidator {
        async fn validate(&self, _token: &str) -> Result<UserIdentity, HfMcpError> {
            match self.behavior {
                "ok" => Ok(UserIdentity {
                    username: "julien".to_string(),
                    fullname: None,
                }),
                "reject" => Err(HfMcpError::Unauthorized("nope".to_string())),
                _ => Err(HfMcpError::TimeoutError("hub down".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_no_token_is_anonymous() {
        let outcome = evaluate_token(&FakeValidator { behavior: "ok" }, None).await;
        assert!(matches!(outcome, AuthOutcome::Anonymous));
    }

    #[tokio::test]
    async fn test_valid_token_authenticates() {
        let outcome = evaluate_token(&FakeValidator { behavior: "ok" }, Some("t")).await;
        assert_eq!(outcome.identity().unwrap().username, "julien");
        assert!(outcome.is_authenticated());
    }

    #[tokio::test]
    async fn test_rejected_token_is_invalid() {
        let outcome = evaluate_token(&FakeValidator { behavior: "reject" }, Some("t")).await;
        assert!(matches!(outcome, AuthOutcome::InvalidToken));
    }

    #[tokio::test]
    async fn test_validator_failure_is_not_auth_failure() {
        let outcome = evaluate_token(&FakeValidator { behavior: "down" }, Some("t")).await;
        assert!(matches!(outcome, AuthOutcome::ValidatorUnavailable));
        assert!(!outcome.is_authenticated());
    }

    #[test]
    fn test_identity_deserializes_hub_shape() {
        let identity: UserIdentity =
            serde_json::from_str(r#"{"name":"julien","fullname":"Julien C"}"#).unwrap();
        assert_eq!(identity.username, "julien");
        assert_eq!(identity.fullname.as_deref(), Some("Julien C"));
    }
}
