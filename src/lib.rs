/// gtp_exporter - A Prometheus exporter for Linux kernel GTP
///
/// This library provides the collection cycle that reads the kernel GTP
/// tunnel table, the GTP devices, and the GTP module metadata on every
/// scrape, together with the HTTP server that exposes the result.
pub mod cli;
pub mod collector;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod modinfo;
pub mod netlink;
pub mod server;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-export core types for convenience
pub use crate::collector::{CollectionOutcome, Collector, Probe, ProbeError};
pub use crate::core::*;
