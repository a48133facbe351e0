//! # Prometheus Exposition Sink
//!
//! This module defines the `PrometheusSink`, which turns the samples of one
//! collection cycle into the Prometheus text exposition format.
//!
//! A sink owns its own `PrometheusRecorder` and is dropped after rendering,
//! so no value survives from one scrape to the next. Tunnels that disappear
//! from the kernel therefore disappear from the output as well.

use super::{MetricDesc, MetricSink, Sample};
use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

static METADATA: Metadata<'static> = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// A single-use sink that renders what it receives as Prometheus text.
pub struct PrometheusSink {
    recorder: PrometheusRecorder,
    samples: usize,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self {
            recorder: PrometheusBuilder::new().build_recorder(),
            samples: 0,
        }
    }

    /// Number of samples emitted into this sink so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Renders every described family and emitted sample.
    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSink for PrometheusSink {
    fn describe(&mut self, desc: &'static MetricDesc) {
        self.recorder.describe_gauge(
            KeyName::from_const_str(desc.name),
            None,
            SharedString::const_str(desc.help),
        );
    }

    fn emit(&mut self, sample: Sample) {
        let labels: Vec<Label> = sample
            .labels()
            .map(|(name, value)| Label::new(name, value.to_string()))
            .collect();
        let key = Key::from_parts(sample.desc.name, labels);
        self.recorder
            .register_gauge(&key, &METADATA)
            .set(sample.value);
        self.samples += 1;
    }
}
