//! In-memory hypervisor for unit tests.
//!
//! Records every call so tests can assert on the exact sequence of
//! mutations, and lets individual operations be forced to fail.

use super::{
    ApplianceInfo, HostInterface, HostResources, Hypervisor, InterfaceKind, MachineEntry,
    MachineInfo, NicWiring,
};
use crate::error::{Error, Result};
use crate::vm::{Frontend, MachineState};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Operations that only read state.
const READS: &[&str] = &[
    "list_machines",
    "machine_info",
    "machine_state",
    "machine_details",
    "guest_property",
    "guest_properties",
    "inspect_appliance",
    "host_interfaces",
    "host_resources",
];

#[derive(Debug, Clone)]
pub(crate) struct FakeMachine {
    pub uuid: String,
    pub accessible: bool,
    pub cpus: u32,
    pub memory_mb: u32,
    pub state: MachineState,
    pub props: BTreeMap<String, String>,
}

impl FakeMachine {
    pub fn new(cpus: u32, memory_mb: u32) -> Self {
        Self {
            uuid: String::new(),
            accessible: true,
            cpus,
            memory_mb,
            state: MachineState::PoweredOff,
            props: BTreeMap::new(),
        }
    }

    pub fn running(mut self) -> Self {
        self.state = MachineState::Running;
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.props.insert("/vm/ip".into(), ip.into());
        self
    }

    pub fn with_prop(mut self, key: &str, value: &str) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug)]
struct FakeState {
    machines: BTreeMap<String, FakeMachine>,
    interfaces: Vec<HostInterface>,
    host: HostResources,
    appliance: ApplianceInfo,
    calls: Vec<String>,
    failing: HashSet<String>,
    power_off_sticks: bool,
    next_uuid: u32,
}

/// Recording in-memory [`Hypervisor`].
#[derive(Debug)]
pub(crate) struct FakeHypervisor {
    state: RefCell<FakeState>,
}

impl Default for FakeHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(FakeState {
                machines: BTreeMap::new(),
                interfaces: vec![HostInterface {
                    name: "en0".into(),
                    kind: InterfaceKind::Bridged,
                    dhcp: true,
                    ip: "192.168.1.20".into(),
                    netmask: "255.255.255.0".into(),
                    status: "Up".into(),
                }],
                host: HostResources {
                    cpus_online: 8,
                    memory_available_mb: 16384,
                },
                appliance: ApplianceInfo {
                    systems: 1,
                    ignored_units: vec![4, 7],
                },
                calls: Vec::new(),
                failing: HashSet::new(),
                power_off_sticks: false,
                next_uuid: 1,
            }),
        }
    }

    /// Register a machine directly, bypassing the call log.
    pub fn add_machine(&self, name: &str, mut machine: FakeMachine) {
        let mut s = self.state.borrow_mut();
        if machine.uuid.is_empty() {
            machine.uuid = format!("uuid-{}", s.next_uuid);
            s.next_uuid += 1;
        }
        s.machines.insert(name.to_string(), machine);
    }

    pub fn add_interface(&self, nic: HostInterface) {
        self.state.borrow_mut().interfaces.push(nic);
    }

    pub fn set_host(&self, host: HostResources) {
        self.state.borrow_mut().host = host;
    }

    pub fn set_appliance(&self, info: ApplianceInfo) {
        self.state.borrow_mut().appliance = info;
    }

    pub fn set_state(&self, name: &str, state: MachineState) {
        if let Some(m) = self.state.borrow_mut().machines.get_mut(name) {
            m.state = state;
        }
    }

    /// Make every call to `op` fail.
    pub fn fail_on(&self, op: &str) {
        self.state.borrow_mut().failing.insert(op.to_string());
    }

    /// Make `power_off` succeed without changing the state.
    pub fn power_off_sticks(&self) {
        self.state.borrow_mut().power_off_sticks = true;
    }

    pub fn machine(&self, name: &str) -> Option<FakeMachine> {
        self.state.borrow().machines.get(name).cloned()
    }

    pub fn interfaces(&self) -> Vec<HostInterface> {
        self.state.borrow().interfaces.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Calls that change hypervisor state, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let op = c.split('(').next().unwrap_or_default();
                !READS.contains(&op)
            })
            .collect()
    }

    /// Operation names of [`mutations`](Self::mutations).
    pub fn mutation_ops(&self) -> Vec<String> {
        self.mutations()
            .into_iter()
            .map(|c| c.split('(').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    fn record(&self, op: &str, args: &[&str]) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(format!("{}({})", op, args.join(", ")));
        if s.failing.contains(op) {
            return Err(Error::command_failed(op, "injected failure"));
        }
        Ok(())
    }

    fn with_machine<T>(&self, name: &str, f: impl FnOnce(&mut FakeMachine) -> T) -> Result<T> {
        let mut s = self.state.borrow_mut();
        s.machines
            .get_mut(name)
            .map(f)
            .ok_or_else(|| Error::MachineNotFound(name.to_string()))
    }
}

impl Hypervisor for FakeHypervisor {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_machines(&self) -> Result<Vec<MachineEntry>> {
        self.record("list_machines", &[])?;
        Ok(self
            .state
            .borrow()
            .machines
            .iter()
            .map(|(name, m)| MachineEntry {
                name: if m.accessible {
                    name.clone()
                } else {
                    "<inaccessible>".into()
                },
                uuid: m.uuid.clone(),
                accessible: m.accessible,
            })
            .collect())
    }

    fn machine_info(&self, name: &str) -> Result<MachineInfo> {
        self.record("machine_info", &[name])?;
        self.with_machine(name, |m| MachineInfo {
            name: name.to_string(),
            uuid: m.uuid.clone(),
            os_type: "Linux_64".into(),
            cpus: m.cpus,
            memory_mb: m.memory_mb,
            state: m.state.clone(),
        })
    }

    fn machine_state(&self, name: &str) -> Result<MachineState> {
        self.record("machine_state", &[name])?;
        self.with_machine(name, |m| m.state.clone())
    }

    fn machine_details(&self, name: &str) -> Result<Vec<(String, String)>> {
        self.record("machine_details", &[name])?;
        self.with_machine(name, |m| {
            vec![
                ("name".to_string(), name.to_string()),
                ("cpus".to_string(), m.cpus.to_string()),
                ("memory".to_string(), m.memory_mb.to_string()),
            ]
        })
    }

    fn guest_property(&self, name: &str, key: &str) -> Result<Option<String>> {
        self.record("guest_property", &[name, key])?;
        self.with_machine(name, |m| m.props.get(key).cloned())
    }

    fn set_guest_property(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.record("set_guest_property", &[name, key, value])?;
        self.with_machine(name, |m| {
            m.props.insert(key.to_string(), value.to_string());
        })
    }

    fn guest_properties(&self, name: &str) -> Result<Vec<(String, String)>> {
        self.record("guest_properties", &[name])?;
        self.with_machine(name, |m| {
            m.props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    fn inspect_appliance(&self, path: &Path) -> Result<ApplianceInfo> {
        self.record("inspect_appliance", &[&path.to_string_lossy()])?;
        Ok(self.state.borrow().appliance.clone())
    }

    fn import_appliance(&self, name: &str, path: &Path, ignored_units: &[u32]) -> Result<()> {
        let units = format!("{:?}", ignored_units);
        self.record("import_appliance", &[name, &path.to_string_lossy(), &units])?;
        self.add_machine(name, FakeMachine::new(1, 1024));
        Ok(())
    }

    fn export_appliance(&self, name: &str, path: &Path) -> Result<()> {
        self.record("export_appliance", &[name, &path.to_string_lossy()])?;
        self.with_machine(name, |_| ())
    }

    fn start(&self, name: &str, frontend: Frontend) -> Result<()> {
        self.record("start", &[name, frontend.as_str()])?;
        self.with_machine(name, |m| m.state = MachineState::Running)
    }

    fn power_off(&self, name: &str) -> Result<()> {
        self.record("power_off", &[name])?;
        let sticks = self.state.borrow().power_off_sticks;
        self.with_machine(name, |m| {
            if !sticks {
                m.state = MachineState::PoweredOff;
            }
        })
    }

    fn unregister_and_delete(&self, name: &str) -> Result<()> {
        self.record("unregister_and_delete", &[name])?;
        self.state
            .borrow_mut()
            .machines
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::MachineNotFound(name.to_string()))
    }

    fn set_boot_disk_only(&self, name: &str) -> Result<()> {
        self.record("set_boot_disk_only", &[name])?;
        self.with_machine(name, |_| ())
    }

    fn set_cpus(&self, name: &str, cpus: u32) -> Result<()> {
        self.record("set_cpus", &[name, &cpus.to_string()])?;
        self.with_machine(name, |m| m.cpus = cpus)
    }

    fn set_memory(&self, name: &str, memory_mb: u32) -> Result<()> {
        self.record("set_memory", &[name, &memory_mb.to_string()])?;
        self.with_machine(name, |m| m.memory_mb = memory_mb)
    }

    fn wire_nics(&self, name: &str, wiring: &NicWiring) -> Result<()> {
        let desc = match wiring {
            NicWiring::HostOnly { adapter } => format!("hostonly:{}", adapter),
            NicWiring::Bridged { adapter } => format!("bridged:{}", adapter),
        };
        self.record("wire_nics", &[name, &desc])?;
        self.with_machine(name, |_| ())
    }

    fn host_interfaces(&self) -> Result<Vec<HostInterface>> {
        self.record("host_interfaces", &[])?;
        Ok(self.state.borrow().interfaces.clone())
    }

    fn create_host_only(&self, gateway: &str, netmask: &str) -> Result<String> {
        self.record("create_host_only", &[gateway, netmask])?;
        let mut s = self.state.borrow_mut();
        let index = s
            .interfaces
            .iter()
            .filter(|i| i.kind == InterfaceKind::HostOnly)
            .count();
        let name = format!("vboxnet{}", index);
        s.interfaces.push(HostInterface {
            name: name.clone(),
            kind: InterfaceKind::HostOnly,
            dhcp: false,
            ip: gateway.to_string(),
            netmask: netmask.to_string(),
            status: "Up".into(),
        });
        Ok(name)
    }

    fn remove_host_only(&self, name: &str) -> Result<()> {
        self.record("remove_host_only", &[name])?;
        self.state.borrow_mut().interfaces.retain(|i| i.name != name);
        Ok(())
    }

    fn host_resources(&self) -> Result<HostResources> {
        self.record("host_resources", &[])?;
        Ok(self.state.borrow().host)
    }
}
