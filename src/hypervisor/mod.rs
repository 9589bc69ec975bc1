//! Hypervisor boundary.
//!
//! Everything vmc does to a machine goes through the [`Hypervisor`] trait.
//! The production implementation, [`VBoxManage`], drives VirtualBox's
//! command-line automation tool; tests use an in-memory fake.

mod vboxmanage;

#[cfg(test)]
pub(crate) mod fake;

pub use vboxmanage::VBoxManage;

use crate::error::Result;
use crate::vm::{Frontend, MachineState};
use serde::Serialize;
use std::path::Path;

/// Entry from the machine registry listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineEntry {
    /// Registered name.
    pub name: String,
    /// Machine UUID.
    pub uuid: String,
    /// False when the machine's settings file cannot be read.
    pub accessible: bool,
}

/// Settings of a single machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    /// Registered name.
    pub name: String,
    /// Machine UUID.
    pub uuid: String,
    /// Guest OS type identifier.
    pub os_type: String,
    /// Number of virtual CPUs.
    pub cpus: u32,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Current power state.
    pub state: MachineState,
}

/// Result of inspecting an OVA before import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplianceInfo {
    /// Number of virtual systems described by the appliance.
    pub systems: usize,
    /// Description units to drop at import (floppy, optical, USB, sound, IDE/SCSI).
    pub ignored_units: Vec<u32>,
}

/// Kind of host network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterfaceKind {
    /// Physical or bridgeable host NIC.
    Bridged,
    /// Host-only virtual adapter.
    HostOnly,
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceKind::Bridged => write!(f, "Bridged"),
            InterfaceKind::HostOnly => write!(f, "HostOnly"),
        }
    }
}

/// Host network interface as seen by the hypervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInterface {
    /// Interface name (e.g. `vboxnet0`, `en0`).
    pub name: String,
    /// Interface kind.
    pub kind: InterfaceKind,
    /// DHCP enabled.
    pub dhcp: bool,
    /// IPv4 address.
    pub ip: String,
    /// IPv4 netmask.
    pub netmask: String,
    /// Link status (`Up`, `Down`, `Unknown`).
    pub status: String,
}

/// Host capacity figures used to avoid oversubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    /// Online processor count.
    pub cpus_online: u32,
    /// Available memory in MB.
    pub memory_available_mb: u64,
}

/// How a machine's two NICs are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicWiring {
    /// NIC1 NAT (host DNS resolver), NIC2 host-only on `adapter`.
    HostOnly {
        /// Host-only adapter name.
        adapter: String,
    },
    /// NIC1 disabled, NIC2 bridged to `adapter`.
    Bridged {
        /// Host NIC to bridge to.
        adapter: String,
    },
}

/// Narrow contract vmc needs from the virtualization engine.
pub trait Hypervisor {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Check if the backend can be used on this host.
    fn is_available(&self) -> bool;

    /// List every registered machine.
    fn list_machines(&self) -> Result<Vec<MachineEntry>>;

    /// Read a machine's settings.
    fn machine_info(&self, name: &str) -> Result<MachineInfo>;

    /// Read only the power state.
    fn machine_state(&self, name: &str) -> Result<MachineState>;

    /// Full key/value dump of a machine's settings, in tool order.
    fn machine_details(&self, name: &str) -> Result<Vec<(String, String)>>;

    /// Read a guest property; `None` when unset.
    fn guest_property(&self, name: &str, key: &str) -> Result<Option<String>>;

    /// Write a guest property.
    fn set_guest_property(&self, name: &str, key: &str, value: &str) -> Result<()>;

    /// Enumerate all guest properties.
    fn guest_properties(&self, name: &str) -> Result<Vec<(String, String)>>;

    /// Describe an OVA without importing it.
    fn inspect_appliance(&self, path: &Path) -> Result<ApplianceInfo>;

    /// Import an OVA as a new machine named `name` (1 CPU, 1024 MB).
    fn import_appliance(&self, name: &str, path: &Path, ignored_units: &[u32]) -> Result<()>;

    /// Export a machine to an OVF 2.0 archive.
    fn export_appliance(&self, name: &str, path: &Path) -> Result<()>;

    /// Launch a machine.
    fn start(&self, name: &str, frontend: Frontend) -> Result<()>;

    /// Hard power-down.
    fn power_off(&self, name: &str) -> Result<()>;

    /// Unregister a machine and delete its disks.
    fn unregister_and_delete(&self, name: &str) -> Result<()>;

    /// Boot from the hard disk only.
    fn set_boot_disk_only(&self, name: &str) -> Result<()>;

    /// Set the number of virtual CPUs.
    fn set_cpus(&self, name: &str, cpus: u32) -> Result<()>;

    /// Set memory size in MB.
    fn set_memory(&self, name: &str, memory_mb: u32) -> Result<()>;

    /// Attach the machine's NICs.
    fn wire_nics(&self, name: &str, wiring: &NicWiring) -> Result<()>;

    /// List host network interfaces of every kind.
    fn host_interfaces(&self) -> Result<Vec<HostInterface>>;

    /// Create a host-only adapter with a static address; returns its name.
    fn create_host_only(&self, gateway: &str, netmask: &str) -> Result<String>;

    /// Remove a host-only adapter.
    fn remove_host_only(&self, name: &str) -> Result<()>;

    /// Host CPU and memory figures.
    fn host_resources(&self) -> Result<HostResources>;
}
