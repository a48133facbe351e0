//! Process-wide `tracing` subscriber setup.

use crate::config::{LogConfig, LogFormat};
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.level, rust_log.as_deref())?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

/// Picks the filter directives: a parseable `rust_log` wins, otherwise the
/// configured level is used and must itself parse.
fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(filter) = rust_log.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| anyhow!("invalid log level {:?}: {}", level, e))
}
