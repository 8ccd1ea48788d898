//! Per-request server factory.
//!
//! For every logical connection (stateful) or request (stateless) the factory
//! evaluates the tool-selection strategy and assembles a scoped
//! [`GatewayServer`]. Built-in descriptors are precomputed at process start,
//! so construction only wires flags and references.

use std::sync::Arc;

use hfmcp_gradio::{
    DiscoveryConfig, HubSpaceClient, SpaceDiscovery, SpaceSchemaClient, SpaceToolUpstream,
};

use crate::auth::{self, AuthOutcome, HubTokenValidator, TokenValidator};
use crate::catalog::{NO_IMAGE_MARKER, README_MARKER};
use crate::headers::{ClientIdentity, McpHeaders};
use crate::hub_api::HubApiClient;
use crate::selection;
use crate::server::GatewayServer;
use crate::settings::{settings_provider_from_env, ResolvedSettings, SettingsProvider};

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    pub headers: McpHeaders,
    /// Client identity from the initialize handshake, when known.
    pub client: Option<ClientIdentity>,
}

pub struct ServerFactory {
    discovery: Arc<SpaceDiscovery>,
    upstream: Arc<SpaceToolUpstream>,
    hub_api: Arc<HubApiClient>,
    settings: Arc<dyn SettingsProvider>,
    validator: Arc<dyn TokenValidator>,
    search_enables_fetch: bool,
}

impl ServerFactory {
    pub fn new(
        discovery: Arc<SpaceDiscovery>,
        upstream: Arc<SpaceToolUpstream>,
        hub_api: Arc<HubApiClient>,
        settings: Arc<dyn SettingsProvider>,
        validator: Arc<dyn TokenValidator>,
        search_enables_fetch: bool,
    ) -> Self {
        Self {
            discovery,
            upstream,
            hub_api,
            settings,
            validator,
            search_enables_fetch,
        }
    }

    pub fn from_env() -> Self {
        let config = DiscoveryConfig::from_env();
        let discovery = Arc::new(SpaceDiscovery::new(
            Arc::new(HubSpaceClient::from_env(config.space_info_timeout)),
            Arc::new(SpaceSchemaClient::new(config.schema_timeout)),
            config.clone(),
        ));
        Self::new(
            discovery,
            Arc::new(SpaceToolUpstream::new(config.upstream_connect_timeout)),
            Arc::new(HubApiClient::from_env()),
            settings_provider_from_env(),
            Arc::new(HubTokenValidator::from_env()),
            hfmcp_base::env_flag("SEARCH_ENABLES_FETCH", false),
        )
    }

    pub fn discovery(&self) -> &Arc<SpaceDiscovery> {
        &self.discovery
    }

    /// Evaluate the request's token. Transports decide what to do with the
    /// outcome (401 vs anonymous continuation).
    pub async fn authorize(&self, headers: &McpHeaders) -> AuthOutcome {
        auth::evaluate_token(self.validator.as_ref(), headers.token.as_deref()).await
    }

    /// Assemble a scoped server for one logical connection or request.
    pub async fn build(
        &self,
        scope: RequestScope,
        auth: AuthOutcome,
        skip_gradio: bool,
    ) -> GatewayServer {
        let settings = self.resolve_settings(&scope, &auth).await;
        let selection = selection::select_tools(
            &scope.headers,
            settings.as_ref(),
            self.search_enables_fetch,
        );

        tracing::debug!(
            "tool selection: mode={:?}, tools={}, gradio={}, reason={}",
            selection.mode,
            selection.enabled_tool_ids.len(),
            selection.gradio_spaces.len(),
            selection.reason
        );

        let include_readme = selection
            .enabled_tool_ids
            .iter()
            .any(|id| id == README_MARKER);
        let strip_images = scope.headers.no_image_content
            || selection
                .enabled_tool_ids
                .iter()
                .any(|id| id == NO_IMAGE_MARKER);

        GatewayServer::new(
            selection,
            scope,
            auth,
            include_readme,
            strip_images,
            skip_gradio,
            self.discovery.clone(),
            self.upstream.clone(),
            self.hub_api.clone(),
        )
    }

    /// Settings are skipped when a known non-`all` bouquet makes them
    /// irrelevant to both the selection and the gradio overlay.
    async fn resolve_settings(
        &self,
        scope: &RequestScope,
        auth: &AuthOutcome,
    ) -> Option<ResolvedSettings> {
        if let Some(name) = scope.headers.bouquet.as_deref() {
            if name != "all" && crate::bouquets::lookup(name).is_some() {
                return None;
            }
        }
        match self.settings.settings_for(auth.identity()).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("settings resolution failed, falling through: {}", e);
                None
            }
        }
    }
}
