//! Fake kernel data sources and an in-memory metric sink for tests.

use crate::{
    core::{InterfaceDescriptor, LinkTable, ModuleFieldLookup, TunnelRecord, TunnelTable},
    metrics::{MetricDesc, MetricSink, Sample},
    modinfo::ModinfoError,
    netlink::NetlinkError,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake tunnel table returning a fixed set of tunnels, or failing.
#[derive(Debug)]
pub struct FakeTunnelTable {
    tunnels: Option<Vec<TunnelRecord>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeTunnelTable {
    pub fn new(tunnels: Vec<TunnelRecord>) -> Self {
        Self {
            tunnels: Some(tunnels),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A table whose every query fails with `EPERM`.
    pub fn failing() -> Self {
        Self {
            tunnels: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every query block for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TunnelTable for FakeTunnelTable {
    fn tunnels(&self) -> Result<Vec<TunnelRecord>, NetlinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.tunnels
            .clone()
            .ok_or_else(|| NetlinkError::Io(io::Error::from(io::ErrorKind::PermissionDenied)))
    }
}

/// Fake link table returning a fixed set of interfaces, or failing.
#[derive(Debug)]
pub struct FakeLinkTable {
    links: Option<Vec<InterfaceDescriptor>>,
    calls: AtomicUsize,
}

impl FakeLinkTable {
    pub fn new(links: Vec<InterfaceDescriptor>) -> Self {
        Self {
            links: Some(links),
            calls: AtomicUsize::new(0),
        }
    }

    /// A table whose every query fails as if the socket could not be opened.
    pub fn failing() -> Self {
        Self {
            links: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LinkTable for FakeLinkTable {
    fn links(&self) -> Result<Vec<InterfaceDescriptor>, NetlinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.links
            .clone()
            .ok_or(NetlinkError::Kernel { errno: 93 })
    }
}

/// Builds a GTP link descriptor.
pub fn gtp_link(index: u32, name: &str, role: u32) -> InterfaceDescriptor {
    InterfaceDescriptor {
        index,
        name: name.to_string(),
        kind: Some("gtp".to_string()),
        gtp_role: Some(role),
    }
}

/// Builds a non-GTP link descriptor.
pub fn plain_link(index: u32, name: &str, kind: Option<&str>) -> InterfaceDescriptor {
    InterfaceDescriptor {
        index,
        name: name.to_string(),
        kind: kind.map(str::to_string),
        gtp_role: None,
    }
}

/// Fake module metadata keyed by field name. Fields not configured fail
/// the way `modinfo` does for an unknown module.
#[derive(Debug, Default)]
pub struct FakeModuleInfo {
    fields: HashMap<String, String>,
    lookups: Mutex<Vec<(String, String)>>,
}

impl FakeModuleInfo {
    pub fn new() -> Self {
        Default::default()
    }

    /// Module info with all three fields set, each followed by a newline
    /// as `modinfo` prints them.
    pub fn loaded(filename: &str, description: &str, srcversion: &str) -> Self {
        Self::new()
            .with_field("filename", &format!("{}\n", filename))
            .with_field("description", &format!("{}\n", description))
            .with_field("srcversion", &format!("{}\n", srcversion))
    }

    pub fn with_field(mut self, field: &str, value: &str) -> Self {
        self.fields.insert(field.to_string(), value.to_string());
        self
    }

    pub fn without_field(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    /// The `(module, field)` pairs looked up so far, in order.
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

impl ModuleFieldLookup for FakeModuleInfo {
    fn lookup(&self, module: &str, field: &str) -> Result<String, ModinfoError> {
        self.lookups
            .lock()
            .unwrap()
            .push((module.to_string(), field.to_string()));
        self.fields.get(field).cloned().ok_or_else(|| ModinfoError::Exit {
            field: field.to_string(),
            code: Some(1),
            stderr: format!("modinfo: ERROR: Module {} not found.", module),
        })
    }
}

/// A sink that records everything it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub described: Vec<&'static MetricDesc>,
    pub samples: Vec<Sample>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Default::default()
    }

    /// Samples of the named metric, in emission order.
    pub fn samples_of(&self, name: &str) -> Vec<&Sample> {
        self.samples.iter().filter(|s| s.desc.name == name).collect()
    }

    /// The value of the single `gtp_up` sample.
    pub fn up(&self) -> Option<f64> {
        match self.samples_of("gtp_up").as_slice() {
            [sample] => Some(sample.value),
            _ => None,
        }
    }

    pub fn described_names(&self) -> Vec<&'static str> {
        self.described.iter().map(|d| d.name).collect()
    }
}

impl MetricSink for RecordingSink {
    fn describe(&mut self, desc: &'static MetricDesc) {
        self.described.push(desc);
    }

    fn emit(&mut self, sample: Sample) {
        self.samples.push(sample);
    }
}
