//! # Metrics Server
//!
//! This module defines the `MetricsServer`, which runs an `axum`-based web
//! server exposing GTP metrics to a Prometheus scraper.
//!
//! Every request to the telemetry path runs one fresh collection cycle on the
//! blocking thread pool and renders its result. The root path serves a small
//! landing page that links to the telemetry path. Every answered scrape is
//! counted by status code, and successful bodies end with those counters.
//!
//! The server shuts down gracefully when the shutdown channel fires.

use crate::collector::Collector;
use crate::metrics::exposition::CONTENT_TYPE;
use crate::metrics::{BuildInfo, PrometheusSink, ScrapeInstruments};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// Shared, read-only state handed to every request.
struct ScrapeState {
    collector: Arc<Collector>,
    build_info: BuildInfo,
    scrape_timeout: Duration,
    instruments: ScrapeInstruments,
}

/// A server that exposes GTP metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    telemetry_path: String,
    state: Arc<ScrapeState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MetricsServer {
    /// Creates a new `MetricsServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `collector` - The collector run on every scrape.
    /// * `telemetry_path` - The route serving metrics, e.g. `/metrics`.
    /// * `scrape_timeout` - Upper bound on one collection cycle.
    /// * `shutdown_rx` - A watch channel receiver for graceful shutdown.
    pub fn new(
        listener: TcpListener,
        collector: Arc<Collector>,
        telemetry_path: String,
        scrape_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            telemetry_path,
            state: Arc::new(ScrapeState {
                collector,
                build_info: BuildInfo::current(),
                scrape_timeout,
                instruments: ScrapeInstruments::new(),
            }),
            shutdown_rx,
        }
    }

    /// Builds the routes served by the exporter.
    fn router(&self) -> Router {
        let landing = landing_page(&self.telemetry_path);
        Router::new()
            .route(&self.telemetry_path, get(scrape))
            .route("/", get(move || async move { Html(landing) }))
            .with_state(self.state.clone())
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = std::io::Result<()>> {
        let app = self.router();
        let mut shutdown_rx = self.shutdown_rx;
        let listener = self.listener;

        async move {
            let shutdown = async move {
                // A dropped sender counts as a shutdown request too.
                let _ = shutdown_rx.changed().await;
                trace!("Metrics server received shutdown signal.");
            };
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await;
            trace!("Metrics server task finished.");
            result
        }
    }
}

async fn scrape(State(state): State<Arc<ScrapeState>>) -> Response {
    let in_flight = state.instruments.begin();
    let response = cycle(&state).await;
    drop(in_flight);
    state.instruments.record(response.status());
    response
}

async fn cycle(state: &ScrapeState) -> Response {
    let collector = state.collector.clone();
    let build_info = state.build_info.clone();

    let cycle = tokio::task::spawn_blocking(move || {
        let mut sink = PrometheusSink::new();
        collector.describe(&mut sink);
        let outcome = collector.collect(&mut sink);
        build_info.record(&mut sink);
        debug!(up = outcome.is_up(), samples = sink.samples(), "Collection cycle finished");
        sink.render()
    });

    match tokio::time::timeout(state.scrape_timeout, cycle).await {
        Ok(Ok(mut body)) => {
            body.push_str(&state.instruments.render());
            ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Collection task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "collection failed\n").into_response()
        }
        Err(_) => {
            warn!(
                timeout_seconds = state.scrape_timeout.as_secs(),
                "Collection cycle timed out"
            );
            (StatusCode::SERVICE_UNAVAILABLE, "collection timed out\n").into_response()
        }
    }
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        r#"<html>
	<head><title>GTP Exporter</title></head>
	<body>
		<h1>GTP Exporter</h1>
		<p><a href="{}">Metrics</a></p>
	</body>
</html>
"#,
        telemetry_path
    )
}
