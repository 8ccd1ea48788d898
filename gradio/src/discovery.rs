//! Parallel space discovery over the two-level cache.
//!
//! Metadata is resolved in batches; schemas are resolved in one parallel
//! sweep over the gradio-filtered survivors. One slow or broken space never
//! fails the others: per-space errors are logged and the space is omitted.

use futures::future::join_all;
use std::sync::Arc;

use hfmcp_base::error::HfMcpError;

use crate::cache::{CacheStats, MetadataCache, SchemaCache, TtlCache};
use crate::config::DiscoveryConfig;
use crate::hub::{SpaceInfoFetcher, SpaceInfoResponse, SpaceMetadata};
use crate::schema::{SchemaFetcher, ToolDescriptor};
use crate::space_id::SpaceId;

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Metadata-only resolution; used by paths that never invoke tools.
    pub skip_schemas: bool,
}

#[derive(Debug, Clone)]
pub struct GradioSpace {
    pub id: SpaceId,
    pub metadata: SpaceMetadata,
    pub tools: Vec<ToolDescriptor>,
}

pub struct SpaceDiscovery {
    metadata_cache: Arc<MetadataCache>,
    schema_cache: Arc<SchemaCache>,
    info: Arc<dyn SpaceInfoFetcher>,
    schemas: Arc<dyn SchemaFetcher>,
    config: DiscoveryConfig,
}

impl SpaceDiscovery {
    pub fn new(
        info: Arc<dyn SpaceInfoFetcher>,
        schemas: Arc<dyn SchemaFetcher>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            metadata_cache: Arc::new(TtlCache::new(config.metadata_ttl)),
            schema_cache: Arc::new(TtlCache::new(config.schema_ttl)),
            info,
            schemas,
            config,
        }
    }

    pub fn metadata_stats(&self) -> CacheStats {
        self.metadata_cache.stats()
    }

    pub fn schema_stats(&self) -> CacheStats {
        self.schema_cache.stats()
    }

    pub fn clear_caches(&self) {
        self.metadata_cache.clear();
        self.schema_cache.clear();
    }

    /// Resolve a list of spaces into proxyable tool surfaces.
    pub async fn resolve_spaces(
        &self,
        ids: &[SpaceId],
        token: Option<&str>,
        options: &DiscoveryOptions,
    ) -> Vec<GradioSpace> {
        // snapshot so a runtime reconfiguration mid-call cannot skew batching
        let config = self.config.clone();

        let mut resolved: Vec<(SpaceId, SpaceMetadata)> = Vec::with_capacity(ids.len());
        for batch in ids.chunks(config.concurrency.max(1)) {
            let lookups = batch
                .iter()
                .map(|id| async move { (id.clone(), self.space_metadata(id, token).await) });
            for (id, outcome) in join_all(lookups).await {
                match outcome {
                    Ok(metadata) => resolved.push((id, metadata)),
                    Err(e) => {
                        tracing::warn!("space metadata fetch failed for {}: {}", id, e);
                    }
                }
            }
        }

        let proxyable: Vec<(SpaceId, SpaceMetadata)> = resolved
            .into_iter()
            .filter(|(id, metadata)| {
                if metadata.is_proxyable() {
                    true
                } else {
                    tracing::debug!(
                        "skipping non-gradio space {} (sdk={:?})",
                        id,
                        metadata.sdk
                    );
                    false
                }
            })
            .collect();

        if options.skip_schemas {
            return proxyable
                .into_iter()
                .map(|(id, metadata)| GradioSpace {
                    id,
                    metadata,
                    tools: Vec::new(),
                })
                .collect();
        }

        let fetches = proxyable.into_iter().map(|(id, metadata)| async move {
            match self.space_schema(&id, &metadata, token).await {
                Ok(tools) if tools.is_empty() => {
                    tracing::warn!("space {} published no callable tools", id);
                    None
                }
                Ok(tools) => Some(GradioSpace {
                    id,
                    metadata,
                    tools,
                }),
                Err(e) => {
                    tracing::warn!("schema fetch failed for {}: {}", id, e);
                    None
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// Resolve metadata for one space, consulting the cache and revalidating
    /// expired entries by ETag. Private spaces are always fetched fresh.
    async fn space_metadata(
        &self,
        id: &SpaceId,
        token: Option<&str>,
    ) -> Result<SpaceMetadata, HfMcpError> {
        let key = id.key();
        if let Some(metadata) = self.metadata_cache.get(&key) {
            return Ok(metadata);
        }

        let stale = self.metadata_cache.get_for_revalidation(&key);
        let etag = stale.as_ref().and_then(|(_, etag)| etag.clone());

        match self.info.fetch_space_info(id, etag.as_deref(), token).await? {
            SpaceInfoResponse::NotModified => {
                // hub confirmed the expired entry; restart its TTL
                let (metadata, _) = stale.ok_or_else(|| {
                    HfMcpError::RuntimeError(format!(
                        "hub returned 304 for {id} without a cached entry"
                    ))
                })?;
                self.metadata_cache.refresh(&key);
                Ok(metadata)
            }
            SpaceInfoResponse::Fresh { metadata, etag } => {
                // private spaces are never cached: authorization-sensitive
                // state must not go stale
                if !metadata.private {
                    self.metadata_cache.insert(&key, metadata.clone(), etag);
                }
                Ok(metadata)
            }
        }
    }

    async fn space_schema(
        &self,
        id: &SpaceId,
        metadata: &SpaceMetadata,
        token: Option<&str>,
    ) -> Result<Vec<ToolDescriptor>, HfMcpError> {
        let key = id.key();
        if let Some(tools) = self.schema_cache.get(&key) {
            return Ok(tools);
        }

        let tools = self
            .schemas
            .fetch_schema(&metadata.subdomain, metadata.private, token)
            .await?;
        if !metadata.private {
            self.schema_cache.insert(&key, tools.clone(), None);
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FakeSpace {
        metadata: SpaceMetadata,
        etag: Option<String>,
        tools: Vec<ToolDescriptor>,
        fail_metadata: bool,
        fail_schema: bool,
    }

    #[derive(Default)]
    struct FakeHub {
        spaces: Mutex<HashMap<String, FakeSpace>>,
        info_calls: AtomicU64,
        schema_calls: AtomicU64,
        seen_etags: Mutex<Vec<Option<String>>>,
        answer_not_modified: Mutex<bool>,
    }

    impl FakeHub {
        fn add(&self, key: &str, private: bool, sdk: &str, tools: Vec<ToolDescriptor>) {
            self.spaces.lock().unwrap().insert(
                key.to_string(),
                FakeSpace {
                    metadata: SpaceMetadata {
                        subdomain: key.replace('/', "-"),
                        emoji: None,
                        private,
                        sdk: Some(sdk.to_string()),
                        runtime: None,
                    },
                    etag: Some(format!("W/\"{key}\"")),
                    tools,
                    fail_metadata: false,
                    fail_schema: false,
                },
            );
        }

        fn add_broken(&self, key: &str, fail_metadata: bool, fail_schema: bool) {
            self.spaces.lock().unwrap().insert(
                key.to_string(),
                FakeSpace {
                    metadata: SpaceMetadata {
                        subdomain: key.replace('/', "-"),
                        emoji: None,
                        private: false,
                        sdk: Some("gradio".to_string()),
                        runtime: None,
                    },
                    etag: None,
                    tools: vec![tool("t")],
                    fail_metadata,
                    fail_schema,
                },
            );
        }
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        }
    }

    #[async_trait]
    impl SpaceInfoFetcher for FakeHub {
        async fn fetch_space_info(
            &self,
            id: &SpaceId,
            etag: Option<&str>,
            _token: Option<&str>,
        ) -> Result<SpaceInfoResponse, HfMcpError> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            self.seen_etags
                .lock()
                .unwrap()
                .push(etag.map(str::to_string));
            let spaces = self.spaces.lock().unwrap();
            let space = spaces
                .get(&id.key())
                .ok_or_else(|| HfMcpError::NotFound(id.key()))?;
            if space.fail_metadata {
                return Err(HfMcpError::TimeoutError("metadata timeout".to_string()));
            }
            if etag.is_some() && *self.answer_not_modified.lock().unwrap() {
                return Ok(SpaceInfoResponse::NotModified);
            }
            Ok(SpaceInfoResponse::Fresh {
                metadata: space.metadata.clone(),
                etag: space.etag.clone(),
            })
        }
    }

    #[async_trait]
    impl SchemaFetcher for FakeHub {
        async fn fetch_schema(
            &self,
            subdomain: &str,
            _private: bool,
            _token: Option<&str>,
        ) -> Result<Vec<ToolDescriptor>, HfMcpError> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            let spaces = self.spaces.lock().unwrap();
            let space = spaces
                .values()
                .find(|s| s.metadata.subdomain == subdomain)
                .ok_or_else(|| HfMcpError::NotFound(subdomain.to_string()))?;
            if space.fail_schema {
                return Err(HfMcpError::TimeoutError("schema timeout".to_string()));
            }
            Ok(space.tools.clone())
        }
    }

    fn discovery(hub: Arc<FakeHub>, config: DiscoveryConfig) -> SpaceDiscovery {
        SpaceDiscovery::new(hub.clone(), hub, config)
    }

    fn ids(keys: &[&str]) -> Vec<SpaceId> {
        keys.iter().map(|k| SpaceId::parse(k).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_cold_discovery_caches_public_only() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);
        hub.add("b/y", false, "gradio", vec![tool("run")]);
        hub.add("c/z", true, "gradio", vec![tool("secret")]);

        let disco = discovery(hub.clone(), DiscoveryConfig::default());
        let spaces = disco
            .resolve_spaces(&ids(&["a/x", "b/y", "c/z"]), Some("tok"), &DiscoveryOptions::default())
            .await;

        // all three resolve, including the private one
        assert_eq!(spaces.len(), 3);
        // but only the public spaces land in either cache
        assert_eq!(disco.metadata_stats().size, 2);
        assert_eq!(disco.schema_stats().size, 2);
    }

    #[tokio::test]
    async fn test_warm_discovery_hits_cache_and_refetches_private() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);
        hub.add("b/y", false, "gradio", vec![tool("run")]);
        hub.add("c/z", true, "gradio", vec![tool("secret")]);

        let disco = discovery(hub.clone(), DiscoveryConfig::default());
        let all = ids(&["a/x", "b/y", "c/z"]);
        let cold = disco
            .resolve_spaces(&all, Some("tok"), &DiscoveryOptions::default())
            .await;
        let cold_info_calls = hub.info_calls.load(Ordering::SeqCst);
        let cold_schema_calls = hub.schema_calls.load(Ordering::SeqCst);
        let cold_misses = disco.metadata_stats().misses;

        let warm = disco
            .resolve_spaces(&all, Some("tok"), &DiscoveryOptions::default())
            .await;

        assert_eq!(cold.len(), warm.len());
        // only the private space goes back out, for metadata and schema
        assert_eq!(hub.info_calls.load(Ordering::SeqCst), cold_info_calls + 1);
        assert_eq!(hub.schema_calls.load(Ordering::SeqCst), cold_schema_calls + 1);

        let stats = disco.metadata_stats();
        assert!(stats.hits >= 2);
        assert_eq!(stats.misses - cold_misses, 1);
        // repeated private fetches never grow the caches
        assert_eq!(stats.size, 2);
        assert_eq!(disco.schema_stats().size, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_revalidates_with_etag() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);

        let config = DiscoveryConfig {
            metadata_ttl: std::time::Duration::from_millis(30),
            ..DiscoveryConfig::default()
        };
        let disco = discovery(hub.clone(), config);
        let one = ids(&["a/x"]);

        disco
            .resolve_spaces(&one, None, &DiscoveryOptions { skip_schemas: true })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        *hub.answer_not_modified.lock().unwrap() = true;

        let spaces = disco
            .resolve_spaces(&one, None, &DiscoveryOptions { skip_schemas: true })
            .await;
        assert_eq!(spaces.len(), 1);

        let seen = hub.seen_etags.lock().unwrap();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_deref(), Some("W/\"a/x\""));

        let stats = disco.metadata_stats();
        assert_eq!(stats.etag_revalidations, 1);
        assert_eq!(stats.size, 1);

        // the refreshed entry serves subsequent lookups without a fetch
        drop(seen);
        let calls = hub.info_calls.load(Ordering::SeqCst);
        disco
            .resolve_spaces(&one, None, &DiscoveryOptions { skip_schemas: true })
            .await;
        assert_eq!(hub.info_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_space() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);
        hub.add_broken("bad/meta", true, false);
        hub.add_broken("bad/schema", false, true);

        let disco = discovery(hub.clone(), DiscoveryConfig::default());
        let spaces = disco
            .resolve_spaces(
                &ids(&["a/x", "bad/meta", "bad/schema", "missing/space"]),
                None,
                &DiscoveryOptions::default(),
            )
            .await;

        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].id.key(), "a/x");
    }

    #[tokio::test]
    async fn test_non_gradio_spaces_filtered() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);
        hub.add("b/static", false, "static", vec![]);

        let disco = discovery(hub.clone(), DiscoveryConfig::default());
        let spaces = disco
            .resolve_spaces(&ids(&["a/x", "b/static"]), None, &DiscoveryOptions::default())
            .await;

        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].id.key(), "a/x");
    }

    #[tokio::test]
    async fn test_skip_schemas_avoids_schema_fetches() {
        let hub = Arc::new(FakeHub::default());
        hub.add("a/x", false, "gradio", vec![tool("infer")]);

        let disco = discovery(hub.clone(), DiscoveryConfig::default());
        let spaces = disco
            .resolve_spaces(&ids(&["a/x"]), None, &DiscoveryOptions { skip_schemas: true })
            .await;

        assert_eq!(spaces.len(), 1);
        assert!(spaces[0].tools.is_empty());
        assert_eq!(hub.schema_calls.load(Ordering::SeqCst), 0);
    }
}
