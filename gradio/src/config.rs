use std::time::Duration;

/// Timings and parallelism for space discovery. Callers copy this at entry so
/// runtime reconfiguration never needs a lock.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// TTL for cached space metadata, measured from entry creation.
    pub metadata_ttl: Duration,
    /// TTL for cached tool schemas, measured from entry creation.
    pub schema_ttl: Duration,
    /// Metadata fetch batch size.
    pub concurrency: usize,
    /// Per-request timeout for hub metadata fetches.
    pub space_info_timeout: Duration,
    /// Per-request timeout for schema fetches.
    pub schema_timeout: Duration,
    /// Connect timeout for per-call upstream tool sessions.
    pub upstream_connect_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            metadata_ttl: Duration::from_millis(300_000),
            schema_ttl: Duration::from_millis(300_000),
            concurrency: 10,
            space_info_timeout: Duration::from_millis(5_000),
            schema_timeout: Duration::from_millis(7_500),
            upstream_connect_timeout: Duration::from_millis(10_000),
        }
    }
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            metadata_ttl: hfmcp_base::env_millis("SPACE_METADATA_TTL_MS", 300_000),
            schema_ttl: hfmcp_base::env_millis("SPACE_SCHEMA_TTL_MS", 300_000),
            concurrency: std::env::var("DISCOVERY_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.concurrency),
            space_info_timeout: hfmcp_base::env_millis("SPACE_INFO_TIMEOUT_MS", 5_000),
            schema_timeout: hfmcp_base::env_millis("SCHEMA_TIMEOUT_MS", 7_500),
            upstream_connect_timeout: hfmcp_base::env_millis("UPSTREAM_CONNECT_TIMEOUT_MS", 10_000),
        }
    }
}
