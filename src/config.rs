//! Configuration management for the GTP exporter
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer defaults, an optional TOML file, environment
//! variables, and finally the command-line flags.

use crate::cli::Cli;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Logging settings.
    pub log: LogConfig,
    /// HTTP listener settings.
    pub web: WebConfig,
    /// Kernel data source settings.
    pub collector: CollectorConfig,
}

/// Configuration for logging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`) or a full
    /// `EnvFilter` directive.
    pub level: String,
    /// Output format of log lines.
    pub format: LogFormat,
}

/// The format for log output.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Configuration for the HTTP server.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebConfig {
    /// Address on which to expose metrics and the landing page.
    pub listen_address: SocketAddr,
    /// Path under which to expose metrics.
    pub telemetry_path: String,
    /// Upper bound on a single collection cycle, in seconds.
    pub scrape_timeout_seconds: u64,
}

impl WebConfig {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_seconds)
    }
}

/// Configuration for the kernel data sources.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Name of the kernel module reported by `gtp_info`.
    pub module_name: String,
    /// The `modinfo` binary used to read module metadata.
    pub modinfo_path: PathBuf,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing order of precedence: built-in
    /// defaults, the TOML file given by `--config`, `GTP_EXPORTER_*`
    /// environment variables (nested keys separated by `__`), and the
    /// command-line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            if !path.exists() {
                bail!("configuration file not found at {:?}", path);
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            // e.g. GTP_EXPORTER_WEB__LISTEN_ADDRESS=127.0.0.1:9721
            .merge(Env::prefixed("GTP_EXPORTER_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would fail later, at route registration or scrape time.
    pub fn validate(&self) -> Result<()> {
        let path = &self.web.telemetry_path;
        if !path.starts_with('/') {
            bail!("telemetry path must start with '/': {:?}", path);
        }
        if path == "/" {
            bail!("telemetry path must not be '/', which serves the landing page");
        }
        if path.contains(['{', '}']) || path.split('/').any(|seg| seg.starts_with([':', '*'])) {
            bail!("telemetry path must be a literal route without captures: {:?}", path);
        }
        if self.web.scrape_timeout_seconds == 0 {
            bail!("scrape timeout must be at least one second");
        }
        if self.collector.module_name.is_empty() {
            bail!("collector module name must not be empty");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig {
                level: "info".to_string(),
                format: LogFormat::Text,
            },
            web: WebConfig {
                listen_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9721)),
                telemetry_path: "/metrics".to_string(),
                scrape_timeout_seconds: 10,
            },
            collector: CollectorConfig {
                module_name: "gtp".to_string(),
                modinfo_path: PathBuf::from("modinfo"),
            },
        }
    }
}
