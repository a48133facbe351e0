//! # Metric Descriptors and Sinks
//!
//! This module defines the fixed set of metrics the exporter can emit and the
//! `MetricSink` seam the collector writes into.
//!
//! ## Components:
//!
//! - **`MetricDesc`**: A static name, help text, and label schema. The four
//!   GTP descriptors are statics here; nothing is registered globally.
//!
//! - **`Sample`**: One emitted value, tied to its descriptor by reference.
//!
//! - **`MetricSink`**: The destination for declarations and samples. The
//!   collector never formats output itself.
//!
//! - **`PrometheusSink`**: (Defined in `exposition.rs`) A per-scrape sink
//!   backed by a fresh `metrics-exporter-prometheus` recorder.
//!
//! - **`ScrapeInstruments`**: (Defined in `scrape.rs`) Process-lifetime
//!   counters about the telemetry endpoint itself.

pub mod exposition;
pub mod scrape;

pub use exposition::PrometheusSink;
pub use scrape::ScrapeInstruments;

/// The static identity of a metric family.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub static UP: MetricDesc = MetricDesc {
    name: "gtp_up",
    help: "Reports whether the last query is successful.",
    labels: &[],
};

pub static TUNNELS: MetricDesc = MetricDesc {
    name: "gtp_tunnels",
    help: "The number of existing tunnels.",
    labels: &["version", "peer"],
};

pub static DEVICES: MetricDesc = MetricDesc {
    name: "gtp_devices",
    help: "The number of existing GTP devices.",
    labels: &["name", "role"],
};

pub static INFO: MetricDesc = MetricDesc {
    name: "gtp_info",
    help: "The information of GTP kernel module.",
    labels: &["filename", "description", "srcversion"],
};

/// Every descriptor the collector can emit, in declaration order.
pub static COLLECTOR_DESCRIPTORS: [&MetricDesc; 4] = [&UP, &TUNNELS, &DEVICES, &INFO];

pub static BUILD_INFO: MetricDesc = MetricDesc {
    name: "gtp_exporter_build_info",
    help: "A metric with a constant '1' value labeled by version and revision from which gtp_exporter was built.",
    labels: &["version", "revision"],
};

/// A single gauge value with its label values, in descriptor order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: &'static MetricDesc,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(desc: &'static MetricDesc, label_values: Vec<String>, value: f64) -> Self {
        debug_assert_eq!(
            desc.labels.len(),
            label_values.len(),
            "label values do not match the schema of {}",
            desc.name
        );
        Self {
            desc,
            label_values,
            value,
        }
    }

    /// Pairs each label name with its value.
    pub fn labels(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.desc
            .labels
            .iter()
            .copied()
            .zip(self.label_values.iter().map(String::as_str))
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

/// Receives metric declarations and samples from a collection cycle.
pub trait MetricSink {
    /// Declares a metric family before or independently of any sample.
    fn describe(&mut self, desc: &'static MetricDesc);

    /// Accepts one sample. Called as soon as the sample is produced.
    fn emit(&mut self, sample: Sample);
}

/// Build metadata reported alongside the collector's metrics.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub revision: String,
}

impl BuildInfo {
    /// Build information of the running binary. The revision comes from
    /// `GTP_EXPORTER_REVISION` at compile time.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: option_env!("GTP_EXPORTER_REVISION")
                .unwrap_or("unset")
                .to_string(),
        }
    }

    pub fn record(&self, sink: &mut dyn MetricSink) {
        sink.describe(&BUILD_INFO);
        sink.emit(Sample::new(
            &BUILD_INFO,
            vec![self.version.clone(), self.revision.clone()],
            1.0,
        ));
    }
}
