//! Self-instrumentation of the telemetry endpoint.
//!
//! Unlike the per-scrape GTP sink these values live for the whole process:
//! a request counter partitioned by HTTP status code and a gauge of scrapes
//! currently being served. Both are appended to every successful scrape.

use axum::http::StatusCode;
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

pub const REQUESTS_TOTAL: &str = "gtp_exporter_scrape_requests_total";
pub const REQUESTS_IN_FLIGHT: &str = "gtp_exporter_scrape_requests_in_flight";

/// Status codes the telemetry handler answers with, reported from zero.
const KNOWN_CODES: [StatusCode; 3] = [
    StatusCode::OK,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::SERVICE_UNAVAILABLE,
];

/// A long-lived recorder holding the scrape counters.
pub struct ScrapeInstruments {
    recorder: PrometheusRecorder,
}

impl ScrapeInstruments {
    pub fn new() -> Self {
        let instruments = Self {
            recorder: PrometheusBuilder::new().build_recorder(),
        };
        instruments.scoped(|| {
            metrics::describe_counter!(REQUESTS_TOTAL, Unit::Count, "Total number of scrapes by HTTP status code.");
            metrics::describe_gauge!(REQUESTS_IN_FLIGHT, Unit::Count, "Current number of scrapes being served.");
            metrics::gauge!(REQUESTS_IN_FLIGHT).set(0.0);
            for code in KNOWN_CODES {
                metrics::counter!(REQUESTS_TOTAL, "code" => code.as_str().to_string()).absolute(0);
            }
        });
        instruments
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }

    /// Marks a scrape as in flight until the returned guard is dropped.
    pub fn begin(&self) -> InFlight<'_> {
        self.scoped(|| metrics::gauge!(REQUESTS_IN_FLIGHT).increment(1.0));
        InFlight { instruments: self }
    }

    /// Counts one answered scrape.
    pub fn record(&self, status: StatusCode) {
        self.scoped(|| {
            metrics::counter!(REQUESTS_TOTAL, "code" => status.as_str().to_string()).increment(1)
        });
    }

    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }
}

impl Default for ScrapeInstruments {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`ScrapeInstruments::begin`].
pub struct InFlight<'a> {
    instruments: &'a ScrapeInstruments,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.instruments
            .scoped(|| metrics::gauge!(REQUESTS_IN_FLIGHT).decrement(1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_start_at_zero() {
        let output = ScrapeInstruments::new().render();
        assert!(output.contains("# TYPE gtp_exporter_scrape_requests_total counter"));
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="200"} 0"#));
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="500"} 0"#));
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="503"} 0"#));
        assert!(output.contains("gtp_exporter_scrape_requests_in_flight 0"));
    }

    #[test]
    fn responses_are_counted_by_code() {
        let instruments = ScrapeInstruments::new();
        instruments.record(StatusCode::OK);
        instruments.record(StatusCode::OK);
        instruments.record(StatusCode::SERVICE_UNAVAILABLE);

        let output = instruments.render();
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="200"} 2"#));
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="503"} 1"#));
        assert!(output.contains(r#"gtp_exporter_scrape_requests_total{code="500"} 0"#));
    }

    #[test]
    fn in_flight_tracks_live_guards() {
        let instruments = ScrapeInstruments::new();
        let first = instruments.begin();
        let second = instruments.begin();
        assert!(instruments.render().contains("gtp_exporter_scrape_requests_in_flight 2"));

        drop(first);
        drop(second);
        assert!(instruments.render().contains("gtp_exporter_scrape_requests_in_flight 0"));
    }
}
