//! The collection cycle.
//!
//! A `Collector` runs three independent probes against the kernel on every
//! scrape: the tunnel table, the link table, and the GTP kernel module's
//! metadata. Samples flow into the sink as each probe produces them. A failed
//! probe is logged and flips `gtp_up` to zero, but never stops the others.

mod devices;
mod module_info;
mod tunnels;

use crate::config::CollectorConfig;
use crate::core::{LinkTable, ModuleFieldLookup, TunnelTable};
use crate::metrics::{MetricSink, Sample, COLLECTOR_DESCRIPTORS, UP};
use crate::modinfo::{ModinfoCommand, ModinfoError};
use crate::netlink::{GtpTunnelTable, NetlinkError, RtnlLinkTable};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a probe could not complete.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Netlink(#[from] NetlinkError),

    #[error(transparent)]
    Modinfo(#[from] ModinfoError),
}

/// The independent sub-collections of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Tunnels,
    Devices,
    ModuleInfo,
}

impl Probe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Probe::Tunnels => "tunnels",
            Probe::Devices => "devices",
            Probe::ModuleInfo => "module_info",
        }
    }

    fn metric(&self) -> &'static str {
        match self {
            Probe::Tunnels => "gtp_tunnels",
            Probe::Devices => "gtp_devices",
            Probe::ModuleInfo => "gtp_info",
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-probe result of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub tunnels: bool,
    pub devices: bool,
    pub module_info: bool,
}

impl CollectionOutcome {
    /// True only when every probe succeeded.
    pub fn is_up(&self) -> bool {
        self.tunnels && self.devices && self.module_info
    }

    /// The probes that failed, in execution order.
    pub fn failed(&self) -> Vec<Probe> {
        [
            (Probe::Tunnels, self.tunnels),
            (Probe::Devices, self.devices),
            (Probe::ModuleInfo, self.module_info),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(probe, _)| probe)
        .collect()
    }
}

/// Collects GTP metrics from the kernel on demand.
///
/// The collector holds no state between cycles; it is safe to share across
/// concurrent scrapes behind an `Arc`.
#[derive(Clone)]
pub struct Collector {
    tunnels: Arc<dyn TunnelTable>,
    links: Arc<dyn LinkTable>,
    modules: Arc<dyn ModuleFieldLookup>,
    module_name: String,
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("module_name", &self.module_name)
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Creates a collector that reads from the running kernel.
    pub fn new(config: &CollectorConfig) -> Self {
        Self::with_sources(
            Arc::new(GtpTunnelTable::new()),
            Arc::new(RtnlLinkTable::new()),
            Arc::new(ModinfoCommand::new(&config.modinfo_path)),
            config.module_name.clone(),
        )
    }

    /// Creates a collector over arbitrary data sources.
    pub fn with_sources(
        tunnels: Arc<dyn TunnelTable>,
        links: Arc<dyn LinkTable>,
        modules: Arc<dyn ModuleFieldLookup>,
        module_name: impl Into<String>,
    ) -> Self {
        Self {
            tunnels,
            links,
            modules,
            module_name: module_name.into(),
        }
    }

    /// Declares every metric this collector can emit. Touches no data source.
    pub fn describe(&self, sink: &mut dyn MetricSink) {
        for desc in COLLECTOR_DESCRIPTORS {
            sink.describe(desc);
        }
    }

    /// Runs one collection cycle, ending with the `gtp_up` sample.
    pub fn collect(&self, sink: &mut dyn MetricSink) -> CollectionOutcome {
        let outcome = CollectionOutcome {
            tunnels: self.run(Probe::Tunnels, sink),
            devices: self.run(Probe::Devices, sink),
            module_info: self.run(Probe::ModuleInfo, sink),
        };

        let up = if outcome.is_up() { 1.0 } else { 0.0 };
        sink.emit(Sample::new(&UP, Vec::new(), up));
        outcome
    }

    fn run(&self, probe: Probe, sink: &mut dyn MetricSink) -> bool {
        let result = match probe {
            Probe::Tunnels => tunnels::collect(self.tunnels.as_ref(), sink),
            Probe::Devices => devices::collect(self.links.as_ref(), sink),
            Probe::ModuleInfo => {
                module_info::collect(self.modules.as_ref(), &self.module_name, sink)
            }
        };
        match result {
            Ok(samples) => {
                debug!(probe = %probe, samples, "Probe finished");
                true
            }
            Err(e) => {
                warn!(
                    probe = %probe,
                    error = %e,
                    "failed to collect {}",
                    probe.metric()
                );
                false
            }
        }
    }
}
