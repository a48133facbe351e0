//! Core domain types and data-source traits for the GTP exporter
//!
//! This module defines the records produced during a collection cycle and the
//! narrow trait contracts through which the collector reads kernel state.

use crate::modinfo::ModinfoError;
use crate::netlink::NetlinkError;
use std::fmt;
use std::net::IpAddr;

/// A PDP context from the kernel GTP tunnel table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRecord {
    /// GTP protocol version (0 or 1 on current kernels)
    pub version: u32,
    /// Address of the remote GSN terminating the tunnel
    pub peer: IpAddr,
    /// Index of the GTP link the tunnel is attached to
    pub link: Option<u32>,
    /// Address of the mobile station (subscriber) behind the tunnel
    pub ms_address: Option<IpAddr>,
    /// GTPv0 tunnel identifier
    pub tid: Option<u64>,
    /// GTPv1 incoming tunnel endpoint identifier
    pub i_tei: Option<u32>,
    /// GTPv1 outgoing tunnel endpoint identifier
    pub o_tei: Option<u32>,
}

impl TunnelRecord {
    /// Creates a record carrying only the fields the exporter labels on.
    pub fn new(version: u32, peer: IpAddr) -> Self {
        Self {
            version,
            peer,
            link: None,
            ms_address: None,
            tid: None,
            i_tei: None,
            o_tei: None,
        }
    }
}

/// A network interface as returned by the kernel link table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceDescriptor {
    pub index: u32,
    pub name: String,
    /// The rtnetlink link kind (`IFLA_INFO_KIND`), absent for physical devices
    pub kind: Option<String>,
    /// The raw `IFLA_GTP_ROLE` value, present only on GTP links
    pub gtp_role: Option<u32>,
}

impl InterfaceDescriptor {
    pub fn is_gtp(&self) -> bool {
        self.kind.as_deref() == Some("gtp")
    }
}

/// The role a GTP device plays in the packet core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Gateway GPRS Support Node
    Ggsn,
    /// Serving GPRS Support Node
    Sgsn,
    /// A role code the exporter does not recognise
    Invalid(u32),
}

impl Role {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Role::Ggsn,
            1 => Role::Sgsn,
            other => Role::Invalid(other),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Ggsn => f.write_str("GGSN"),
            Role::Sgsn => f.write_str("SGSN"),
            Role::Invalid(code) => write!(f, "invalid role: {}", code),
        }
    }
}

/// A GTP network device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub role: Role,
}

/// Metadata describing the loaded GTP kernel module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub filename: String,
    pub description: String,
    pub srcversion: String,
}

// =============================================================================
// Data-source Traits
// =============================================================================

/// Reads the kernel GTP tunnel (PDP context) table
pub trait TunnelTable: Send + Sync {
    /// Returns every tunnel currently known to the kernel
    ///
    /// # Returns
    /// * `Ok(Vec<TunnelRecord>)`, possibly empty
    /// * `Err` if the table could not be queried (no GTP support, permissions)
    fn tunnels(&self) -> Result<Vec<TunnelRecord>, NetlinkError>;
}

/// Enumerates the kernel network interfaces
pub trait LinkTable: Send + Sync {
    /// Returns all interfaces, GTP or not
    fn links(&self) -> Result<Vec<InterfaceDescriptor>, NetlinkError>;
}

/// Looks up a single metadata field of a kernel module
pub trait ModuleFieldLookup: Send + Sync {
    /// Returns the raw value of `field` for `module`, as printed by the system
    ///
    /// # Arguments
    /// * `module` - The kernel module name, e.g. `gtp`
    /// * `field` - The modinfo field, e.g. `filename`
    fn lookup(&self, module: &str, field: &str) -> Result<String, ModinfoError>;
}
