//! Tracing bootstrap shared by all binaries.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "hfmcp=debug,tower_http=warn".
    pub level: Option<String>,
    /// When set, logs additionally go to a daily-rotated file in `dir`.
    pub file_name: Option<String>,
    pub dir: Option<String>,
    pub use_json: bool,
}

pub fn load_logging_config_from_env() -> Result<LoggingConfig> {
    Ok(LoggingConfig {
        level: std::env::var("LOG_LEVEL").ok(),
        file_name: std::env::var("LOG_FILE_NAME").ok(),
        dir: std::env::var("LOG_FILE_DIR").ok(),
        use_json: crate::env_flag("LOG_USE_JSON", false),
    })
}

/// Initialize the global tracing subscriber. The returned guard must be held
/// for the process lifetime when file logging is enabled, otherwise buffered
/// lines are lost on exit.
pub fn tracing_init(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match &config.level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if let Some(file_name) = &config.file_name {
        let dir = config.dir.clone().unwrap_or_else(|| "log".to_string());
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if config.use_json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
        }
        Ok(Some(guard))
    } else {
        if config.use_json {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        Ok(None)
    }
}
