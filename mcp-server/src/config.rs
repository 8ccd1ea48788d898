use serde::Serialize;
use std::time::Duration;

/// Transport-layer timings and modes.
#[derive(Clone, Debug, Serialize)]
pub struct TransportConfig {
    /// Per-session dead-stream detection interval.
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    /// Stale-session sweep interval.
    #[serde(with = "duration_millis")]
    pub stale_check_interval: Duration,
    /// Idle time after which a session is evicted.
    #[serde(with = "duration_millis")]
    pub stale_timeout: Duration,
    pub ping_enabled: bool,
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,
    /// Consecutive ping failures before a session is flagged distressed.
    pub ping_failure_threshold: u32,
    /// Reject the welcome page with 405 instead of serving it.
    pub strict_compliance: bool,
    /// Stateless transport: keep an analytics-only session table.
    pub analytics_mode: bool,
    /// Bounded diagnostic logging on session-resume failure.
    pub temp_log_budget: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(30_000),
            stale_check_interval: Duration::from_millis(90_000),
            stale_timeout: Duration::from_millis(300_000),
            ping_enabled: true,
            ping_interval: Duration::from_millis(30_000),
            ping_failure_threshold: 1,
            strict_compliance: false,
            analytics_mode: false,
            temp_log_budget: 0,
        }
    }
}

impl TransportConfig {
    /// `default_stale_ms` differs by transport: 300000 for streaming HTTP,
    /// 600000 for SSE-heavy deployments.
    pub fn from_env(default_stale_ms: u64) -> Self {
        Self {
            heartbeat_interval: hfmcp_base::env_millis("HEARTBEAT_INTERVAL_MS", 30_000),
            stale_check_interval: hfmcp_base::env_millis("STALE_CHECK_INTERVAL_MS", 90_000),
            stale_timeout: hfmcp_base::env_millis("STALE_TIMEOUT_MS", default_stale_ms),
            ping_enabled: hfmcp_base::env_flag("PING_ENABLED", true),
            ping_interval: hfmcp_base::env_millis("PING_INTERVAL_MS", 30_000),
            ping_failure_threshold: std::env::var("PING_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            strict_compliance: hfmcp_base::env_flag("STRICT_COMPLIANCE", false),
            analytics_mode: hfmcp_base::env_flag("ANALYTICS_MODE", false),
            temp_log_budget: std::env::var("TEMP_LOG_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
