//! gtp_exporter - Prometheus exporter for Linux kernel GTP
//!
//! Exposes the kernel GTP tunnel table, GTP devices, and GTP module metadata
//! as Prometheus metrics, collected fresh on every scrape.

use anyhow::{Context, Result};
use clap::Parser;
use gtp_exporter::{
    cli::Cli,
    config::Config,
    logging,
    metrics::BuildInfo,
    server::MetricsServer,
    Collector,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            // The configured subscriber is not available yet.
            let _ = tracing_subscriber::fmt().try_init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    logging::init(&config.log)?;

    let build = BuildInfo::current();
    info!(version = %build.version, revision = %build.revision, "Starting gtp_exporter");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log.level);
    info!("Telemetry Path: {}", config.web.telemetry_path);
    info!("Scrape Timeout: {}s", config.web.scrape_timeout_seconds);
    info!("Kernel Module: {}", config.collector.module_name);
    info!("Modinfo Binary: {}", config.collector.modinfo_path.display());
    info!("-------------------------------------------------------");

    let collector = Arc::new(Collector::new(&config.collector));

    let listener = TcpListener::bind(config.web.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.web.listen_address))?;
    info!(address = %listener.local_addr()?, "Listening on address");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = MetricsServer::new(
        listener,
        collector,
        config.web.telemetry_path.clone(),
        config.web.scrape_timeout(),
        shutdown_rx,
    );
    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received. Shutting down gracefully...");
        }
        result = &mut server_task => {
            return finish(result);
        }
    }

    // The receiver may already be gone if the server exited on its own.
    let _ = shutdown_tx.send(true);
    finish(server_task.await)?;

    info!("Server shut down. Exiting.");
    Ok(())
}

fn finish(result: Result<std::io::Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Metrics server error: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!("Metrics server task panicked: {:?}", e);
            Err(e.into())
        }
    }
}
