//! Snapshot of the hypervisor's machine registry.
//!
//! Fetched once per command and reused for every lookup. It is never
//! refreshed behind the caller's back: operations that change the registry
//! call [`RegistrySnapshot::refresh`] explicitly.

use crate::error::Result;
use crate::hypervisor::Hypervisor;
use crate::vm::MachineState;
use serde::Serialize;

/// Guest property holding a machine's assigned address.
pub const IP_PROPERTY: &str = "/vm/ip";

/// One registered machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineRecord {
    /// Registered name.
    pub name: String,
    /// Machine UUID.
    pub uuid: String,
    /// False when the hypervisor cannot read the machine's settings.
    pub accessible: bool,
    /// Guest OS type.
    pub os_type: String,
    /// Virtual CPUs.
    pub cpus: u32,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Power state at snapshot time.
    pub state: MachineState,
    /// Stored `/vm/ip`, if set.
    pub ip: Option<String>,
}

/// Machines known to the hypervisor at a point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    machines: Vec<MachineRecord>,
}

impl RegistrySnapshot {
    /// Read the registry.
    pub fn load(hv: &dyn Hypervisor) -> Result<Self> {
        let mut snapshot = Self::default();
        snapshot.refresh(hv)?;
        Ok(snapshot)
    }

    /// Re-read the registry, replacing the cached records.
    pub fn refresh(&mut self, hv: &dyn Hypervisor) -> Result<()> {
        let entries = hv.list_machines()?;
        let mut machines = Vec::with_capacity(entries.len());

        for entry in entries {
            if !entry.accessible {
                machines.push(MachineRecord {
                    name: entry.name,
                    uuid: entry.uuid,
                    accessible: false,
                    os_type: String::new(),
                    cpus: 0,
                    memory_mb: 0,
                    state: MachineState::Other("inaccessible".into()),
                    ip: None,
                });
                continue;
            }

            let info = match hv.machine_info(&entry.name) {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(vm = %entry.name, error = %e, "skipping unreadable vm");
                    continue;
                }
            };
            let ip = match hv.guest_property(&entry.name, IP_PROPERTY) {
                Ok(ip) => ip,
                Err(e) => {
                    tracing::warn!(vm = %entry.name, error = %e, "skipping unreadable vm");
                    continue;
                }
            };

            machines.push(MachineRecord {
                name: entry.name,
                uuid: entry.uuid,
                accessible: true,
                os_type: info.os_type,
                cpus: info.cpus,
                memory_mb: info.memory_mb,
                state: info.state,
                ip,
            });
        }

        tracing::debug!(count = machines.len(), "loaded machine registry");
        self.machines = machines;
        Ok(())
    }

    /// All records, inaccessible ones included.
    pub fn machines(&self) -> &[MachineRecord] {
        &self.machines
    }

    /// Look up an accessible machine by exact name.
    pub fn find(&self, name: &str) -> Option<&MachineRecord> {
        self.machines
            .iter()
            .find(|m| m.accessible && m.name == name)
    }

    /// Name of the machine holding `ip`, ignoring `exclude`.
    pub fn ip_holder(&self, ip: &str, exclude: Option<&str>) -> Option<&str> {
        self.machines
            .iter()
            .filter(|m| m.accessible && Some(m.name.as_str()) != exclude)
            .find(|m| m.ip.as_deref() == Some(ip))
            .map(|m| m.name.as_str())
    }

    /// Whether any machine other than `exclude` holds `ip`.
    pub fn ip_in_use(&self, ip: &str, exclude: Option<&str>) -> bool {
        self.ip_holder(ip, exclude).is_some()
    }

    /// Stored addresses of accessible machines.
    pub fn ips(&self) -> Vec<&str> {
        self.machines
            .iter()
            .filter(|m| m.accessible)
            .filter_map(|m| m.ip.as_deref())
            .collect()
    }
}
