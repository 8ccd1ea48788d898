use once_cell::sync::Lazy;
use std::{env, net::SocketAddr};

pub mod error;
pub mod logging;
pub mod shutdown;

pub static APP_NAME: &str = "hfmcp";

pub static HF_HUB_URL: Lazy<String> =
    Lazy::new(|| env::var("HF_HUB_URL").unwrap_or_else(|_| "https://huggingface.co".to_string()));

pub static MCP_ADDR: Lazy<SocketAddr> = Lazy::new(|| {
    env::var("MCP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()
        .unwrap()
});

pub static USER_SETTINGS_FILE: Lazy<Option<String>> =
    Lazy::new(|| env::var("USER_SETTINGS_FILE").ok());

/// Read a boolean flag from the environment with a default.
pub fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Read a millisecond duration from the environment with a default.
pub fn env_millis(key: &str, default_ms: u64) -> std::time::Duration {
    std::time::Duration::from_millis(
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_ms),
    )
}
