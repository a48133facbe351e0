//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the exporter using the
//! `clap` crate. Flags are parsed at startup and merged, with the highest
//! precedence, over the configuration file and environment variables.

use crate::config::LogFormat;
use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Prometheus exporter for Linux kernel GTP tunnels and devices.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "gtp_exporter", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address on which to expose metrics and web interface.
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Maximum time a single scrape may spend collecting.
    #[arg(long = "web.scrape-timeout-seconds", value_name = "SECONDS")]
    pub scrape_timeout_seconds: Option<u64>,

    /// Only log messages with the given severity or above.
    #[arg(long = "log.level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Output format of log messages.
    #[arg(long = "log.format", value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut web = Dict::new();
        if let Some(addr) = self.listen_address {
            web.insert("listen_address".into(), Value::from(addr.to_string()));
        }
        if let Some(path) = &self.telemetry_path {
            web.insert("telemetry_path".into(), Value::from(path.clone()));
        }
        if let Some(timeout) = self.scrape_timeout_seconds {
            web.insert("scrape_timeout_seconds".into(), Value::from(timeout));
        }

        let mut log = Dict::new();
        if let Some(level) = &self.log_level {
            log.insert("level".into(), Value::from(level.clone()));
        }
        if let Some(format) = self.log_format {
            let format = match format {
                LogFormat::Text => "text",
                LogFormat::Json => "json",
            };
            log.insert("format".into(), Value::from(format));
        }

        // Only flags that were actually given are emitted, so they never
        // mask values from the file or the environment.
        let mut dict = Dict::new();
        if !web.is_empty() {
            dict.insert("web".into(), Value::from(web));
        }
        if !log.is_empty() {
            dict.insert("log".into(), Value::from(log));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
