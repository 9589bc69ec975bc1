//! Machine lifecycle management.
//!
//! [`Manager`] ties the hypervisor, the guest shell, the settings and a
//! registry snapshot together and implements every lifecycle operation:
//! - create from an image, start, stop, delete
//! - resize (CPU/memory) with a host capacity check
//! - address and network type assignment

pub mod power;
pub mod state;

pub use power::{stop_machine, wait_until_stopped, ShutdownPolicy};
pub use state::{Frontend, MachineState};

use crate::config::VmcConfig;
use crate::error::{Error, Result};
use crate::guest::RemoteShell;
use crate::hypervisor::Hypervisor;
use crate::ip;
use crate::network::{self, NetType};
use crate::registry::{MachineRecord, RegistrySnapshot, IP_PROPERTY};
use std::path::Path;

/// Longest accepted machine name.
pub const MAX_NAME_LEN: usize = 64;

/// Guest property keys written for the guest's boot scripts.
pub mod props {
    /// Machine name.
    pub const NAME: &str = "/vm/name";
    /// `ho` or `bri`.
    pub const NET_TYPE: &str = "/vm/nettype";
    /// Assigned address.
    pub const IP: &str = super::IP_PROPERTY;
    /// Netmask.
    pub const NETMASK: &str = "/vm/netmask";
    /// Broadcast address.
    pub const BROADCAST: &str = "/vm/broadcast";
}

/// Validate a machine name.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::invalid_name(
            name,
            format!("name longer than {} characters", MAX_NAME_LEN),
        ));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_name(name, "name cannot contain path separators"));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::invalid_name(name, "name cannot contain control characters"));
    }
    Ok(())
}

/// Lifecycle operations over one registry snapshot.
pub struct Manager<'a> {
    hv: &'a dyn Hypervisor,
    shell: &'a dyn RemoteShell,
    config: &'a VmcConfig,
    registry: RegistrySnapshot,
    shutdown: ShutdownPolicy,
}

impl<'a> Manager<'a> {
    /// Load the registry and build a manager.
    pub fn new(
        hv: &'a dyn Hypervisor,
        shell: &'a dyn RemoteShell,
        config: &'a VmcConfig,
    ) -> Result<Self> {
        Ok(Self {
            hv,
            shell,
            config,
            registry: RegistrySnapshot::load(hv)?,
            shutdown: config.shutdown_policy(),
        })
    }

    /// Override the shutdown polling bounds.
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    /// Hypervisor in use.
    pub fn hypervisor(&self) -> &'a dyn Hypervisor {
        self.hv
    }

    /// Guest shell in use.
    pub fn shell(&self) -> &'a dyn RemoteShell {
        self.shell
    }

    /// Current registry snapshot.
    pub fn registry(&self) -> &RegistrySnapshot {
        &self.registry
    }

    /// Re-read the registry.
    pub fn refresh(&mut self) -> Result<()> {
        self.registry.refresh(self.hv)
    }

    /// Look up a registered machine.
    pub fn require(&self, name: &str) -> Result<&MachineRecord> {
        self.registry
            .find(name)
            .ok_or_else(|| Error::MachineNotFound(name.to_string()))
    }

    /// Live power state.
    pub fn state(&self, name: &str) -> Result<MachineState> {
        self.hv.machine_state(name)
    }

    /// Whether a registered machine is currently running.
    pub fn is_running(&self, name: &str) -> Result<bool> {
        self.require(name)?;
        Ok(self.state(name)?.is_running())
    }

    /// Stored address, if valid.
    pub fn stored_ip(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .hv
            .guest_property(name, props::IP)?
            .filter(|ip| ip::validate_ipv4(ip)))
    }

    /// Stored network type (host-only when unset or unreadable).
    pub fn net_type(&self, name: &str) -> Result<NetType> {
        Ok(self
            .hv
            .guest_property(name, props::NET_TYPE)?
            .and_then(|v| v.parse().ok())
            .unwrap_or_default())
    }

    /// Import `image` as a new machine and give it the next free address.
    pub fn create_machine(&mut self, name: &str, image: &Path) -> Result<()> {
        check_name(name)?;
        if self.registry.find(name).is_some() {
            return Err(Error::MachineExists(name.to_string()));
        }

        let appliance = self.hv.inspect_appliance(image)?;
        if appliance.systems != 1 {
            return Err(Error::image(format!(
                "'{}' describes {} virtual systems, expected exactly one",
                image.display(),
                appliance.systems
            )));
        }

        tracing::info!(vm = %name, image = %image.display(), "creating vm");
        self.hv
            .import_appliance(name, image, &appliance.ignored_units)?;
        self.hv.set_boot_disk_only(name)?;
        self.hv
            .set_guest_property(name, props::NET_TYPE, NetType::HostOnly.as_str())?;
        self.refresh()?;

        let probe = self.config.probe_live_ips;
        let registry = &self.registry;
        let ip = ip::next_available_ip(&self.config.default_ip, |candidate| {
            registry.ip_in_use(candidate, Some(name)) || (probe && ip::ping_probe(candidate))
        })?;

        self.set_machine_ip(name, &ip)
    }

    /// Start a stopped machine.
    pub fn start_machine(&mut self, name: &str, frontend: Frontend) -> Result<()> {
        self.require(name)?;
        let state = self.state(name)?;
        if state.is_running() {
            return Err(Error::invalid_state(name, "not running", state.name()));
        }

        let ip = self
            .stored_ip(name)?
            .ok_or_else(|| Error::network(format!("vm '{}' has no valid ip assigned", name)))?;
        ip::ensure_assignable(&ip)?;
        let nettype = self.net_type(name)?;
        self.apply_network(name, &ip, nettype)?;

        tracing::info!(vm = %name, frontend = frontend.as_str(), "starting vm");
        self.hv.start(name, frontend)?;

        if !self.state(name)?.is_running() {
            return Err(Error::StartFailed(name.to_string()));
        }
        Ok(())
    }

    /// Stop a running machine; `graceful` tries an in-guest shutdown first.
    pub fn stop_machine(&mut self, name: &str, graceful: bool) -> Result<()> {
        self.require(name)?;
        let state = self.state(name)?;
        if !state.is_running() {
            return Err(Error::invalid_state(name, "running", state.name()));
        }

        let ip = if graceful { self.stored_ip(name)? } else { None };
        stop_machine(self.hv, self.shell, name, ip.as_deref(), &self.shutdown)
    }

    /// Stop (when running) and delete a machine with its disks.
    pub fn delete_machine(&mut self, name: &str) -> Result<()> {
        self.require(name)?;
        if self.state(name)?.is_running() {
            self.stop_machine(name, true)?;
        }

        tracing::info!(vm = %name, "deleting vm");
        self.hv.unregister_and_delete(name)?;
        self.refresh()
    }

    /// Resize a powered-off machine, keeping the configured host reserve.
    pub fn modify_machine(&mut self, name: &str, cpus: u32, memory_mb: u32) -> Result<()> {
        self.require(name)?;
        if cpus == 0 || memory_mb == 0 {
            return Err(Error::invalid_argument("cpus and memory must be positive"));
        }
        let state = self.state(name)?;
        if state != MachineState::PoweredOff {
            return Err(Error::invalid_state(name, "powered off", state.name()));
        }

        let host = self.hv.host_resources()?;
        let cpu_left = host.cpus_online.checked_sub(cpus);
        if cpu_left.map_or(true, |left| left < self.config.host_cpu_reserve) {
            return Err(Error::HostCapacity(format!(
                "{} cpus requested, host has {} and keeps {} for itself",
                cpus, host.cpus_online, self.config.host_cpu_reserve
            )));
        }
        let mem_left = host.memory_available_mb.checked_sub(u64::from(memory_mb));
        if mem_left.map_or(true, |left| left < self.config.host_memory_reserve_mb) {
            return Err(Error::HostCapacity(format!(
                "{} MB requested, host has {} MB available and keeps {} MB for itself",
                memory_mb, host.memory_available_mb, self.config.host_memory_reserve_mb
            )));
        }

        tracing::info!(vm = %name, cpus, memory_mb, "resizing vm");
        self.hv.set_cpus(name, cpus)?;
        self.hv.set_memory(name, memory_mb)?;
        self.refresh()
    }

    /// Assign `ip` to a machine and wire its NICs for it.
    pub fn set_machine_ip(&mut self, name: &str, ip: &str) -> Result<()> {
        self.require(name)?;
        ip::ensure_assignable(ip)?;
        if let Some(owner) = self.registry.ip_holder(ip, Some(name)) {
            return Err(Error::IpConflict {
                ip: ip.to_string(),
                owner: owner.to_string(),
            });
        }

        let nettype = self.net_type(name)?;
        tracing::info!(vm = %name, ip = %ip, nettype = %nettype, "assigning ip");
        self.apply_network(name, ip, nettype)?;
        self.refresh()
    }

    /// Switch a machine's network type.
    pub fn set_machine_net_type(&mut self, name: &str, nettype: NetType) -> Result<()> {
        self.require(name)?;
        self.hv
            .set_guest_property(name, props::NET_TYPE, nettype.as_str())?;

        if let Some(ip) = self.stored_ip(name)? {
            self.apply_network(name, &ip, nettype)?;
        }
        Ok(())
    }

    fn apply_network(&self, name: &str, ip: &str, nettype: NetType) -> Result<()> {
        let wiring = network::wiring_for(self.hv, nettype, ip)?;
        self.hv.wire_nics(name, &wiring)?;

        let broadcast = ip::broadcast_for(ip).ok_or_else(|| Error::InvalidIp(ip.to_string()))?;
        for (key, value) in [
            (props::NAME, name),
            (props::NET_TYPE, nettype.as_str()),
            (props::IP, ip),
            (props::NETMASK, ip::NETMASK),
            (props::BROADCAST, broadcast.as_str()),
        ] {
            self.hv.set_guest_property(name, key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::fake::FakeShell;
    use crate::hypervisor::fake::{FakeHypervisor, FakeMachine};
    use crate::hypervisor::{ApplianceInfo, HostResources};
    use std::time::Duration;

    fn instant() -> ShutdownPolicy {
        ShutdownPolicy {
            interval: Duration::ZERO,
            attempts: 1,
        }
    }

    fn manager<'a>(
        hv: &'a FakeHypervisor,
        shell: &'a FakeShell,
        config: &'a VmcConfig,
    ) -> Manager<'a> {
        Manager::new(hv, shell, config)
            .unwrap()
            .with_shutdown_policy(instant())
    }

    #[test]
    fn test_check_name() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let cases = [
            ("dev1", true),
            ("my-vm_2", true),
            ("", false),
            ("a/b", false),
            ("a\\b", false),
            ("tab\there", false),
            (long.as_str(), false),
        ];
        for (name, ok) in cases {
            assert_eq!(check_name(name).is_ok(), ok, "check_name({:?})", name);
        }
        assert!(check_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_create_assigns_first_free_ip() {
        let hv = FakeHypervisor::new();
        hv.add_machine("old", FakeMachine::new(1, 1024).with_ip("10.11.12.2"));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        mgr.create_machine("dev1", Path::new("/img/centos.ova")).unwrap();

        let vm = hv.machine("dev1").unwrap();
        assert_eq!(vm.props.get(props::IP).map(String::as_str), Some("10.11.12.3"));
        assert_eq!(vm.props.get(props::NET_TYPE).map(String::as_str), Some("ho"));
        assert_eq!(vm.props.get(props::BROADCAST).map(String::as_str), Some("10.11.12.255"));
        assert_eq!(vm.props.get(props::NAME).map(String::as_str), Some("dev1"));
        assert_eq!(mgr.registry().find("dev1").unwrap().ip.as_deref(), Some("10.11.12.3"));

        let ops = hv.mutation_ops();
        assert_eq!(
            &ops[..3],
            &["import_appliance", "set_boot_disk_only", "set_guest_property"]
        );
        assert!(ops.contains(&"create_host_only".to_string()));
        assert!(ops.contains(&"wire_nics".to_string()));
        assert!(hv.mutations()[0].contains("[4, 7]"), "units disabled at import");
    }

    #[test]
    fn test_create_rejects_existing_and_multi_system_images() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        assert!(matches!(
            mgr.create_machine("dev1", Path::new("x.ova")),
            Err(Error::MachineExists(_))
        ));

        hv.set_appliance(ApplianceInfo {
            systems: 2,
            ignored_units: vec![],
        });
        assert!(matches!(
            mgr.create_machine("dev2", Path::new("x.ova")),
            Err(Error::Image(_))
        ));
        assert!(hv.mutations().is_empty());
    }

    #[test]
    fn test_start_requires_ip_and_rewires() {
        let hv = FakeHypervisor::new();
        hv.add_machine("noip", FakeMachine::new(1, 1024));
        hv.add_machine(
            "dev1",
            FakeMachine::new(1, 1024)
                .with_ip("10.11.12.2")
                .with_prop(props::NET_TYPE, "bri"),
        );
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        assert!(mgr.start_machine("noip", Frontend::Headless).is_err());
        assert!(hv.mutations().is_empty());

        mgr.start_machine("dev1", Frontend::Gui).unwrap();
        let mutations = hv.mutations();
        assert_eq!(mutations[0], "wire_nics(dev1, bridged:en0)");
        assert_eq!(mutations.last().unwrap(), "start(dev1, gui)");

        assert!(matches!(
            mgr.start_machine("dev1", Frontend::Headless),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_start_failure_detected() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).with_ip("10.11.12.2"));
        hv.fail_on("start");
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);
        assert!(mgr.start_machine("dev1", Frontend::Headless).is_err());
        assert_eq!(hv.machine("dev1").unwrap().state, MachineState::PoweredOff);
    }

    #[test]
    fn test_stop_requires_running() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);
        assert!(matches!(
            mgr.stop_machine("dev1", true),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            mgr.stop_machine("ghost", true),
            Err(Error::MachineNotFound(_))
        ));
    }

    #[test]
    fn test_is_running() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024));
        hv.add_machine("dev2", FakeMachine::new(1, 1024).running());
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mgr = manager(&hv, &shell, &config);

        assert!(!mgr.is_running("dev1").unwrap());
        assert!(mgr.is_running("dev2").unwrap());
        assert!(matches!(mgr.is_running("ghost"), Err(Error::MachineNotFound(_))));
    }

    #[test]
    fn test_graceful_stop_asks_guest_first() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).running().with_ip("10.11.12.2"));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        mgr.stop_machine("dev1", true).unwrap();
        assert_eq!(shell.commands(), vec!["10.11.12.2: sudo poweroff"]);
        assert_eq!(hv.mutation_ops(), vec!["power_off"]);
    }

    #[test]
    fn test_forced_stop_skips_guest() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).running().with_ip("10.11.12.2"));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        mgr.stop_machine("dev1", false).unwrap();
        assert!(shell.commands().is_empty());
        assert_eq!(hv.mutation_ops(), vec!["power_off"]);
    }

    #[test]
    fn test_delete_stops_then_unregisters() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).running().with_ip("10.11.12.2"));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        mgr.delete_machine("dev1").unwrap();
        assert_eq!(shell.commands(), vec!["10.11.12.2: sudo poweroff"]);
        assert_eq!(hv.mutation_ops(), vec!["power_off", "unregister_and_delete"]);
        assert!(mgr.registry().find("dev1").is_none());
    }

    #[test]
    fn test_modify_checks_host_capacity() {
        let hv = FakeHypervisor::new();
        hv.set_host(HostResources {
            cpus_online: 4,
            memory_available_mb: 12288,
        });
        hv.add_machine("dev1", FakeMachine::new(1, 1024));
        hv.add_machine("up", FakeMachine::new(1, 1024).running());
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        let cases = [
            (3, 1024, false),  // leaves 1 cpu
            (2, 4097, false),  // leaves < 8192 MB
            (8, 1024, false),  // more cpus than the host has
            (0, 1024, false),
            (2, 4096, true),
        ];
        for (cpus, mem, ok) in cases {
            assert_eq!(
                mgr.modify_machine("dev1", cpus, mem).is_ok(),
                ok,
                "modify_machine(dev1, {}, {})",
                cpus,
                mem
            );
        }
        let vm = hv.machine("dev1").unwrap();
        assert_eq!((vm.cpus, vm.memory_mb), (2, 4096));

        assert!(matches!(
            mgr.modify_machine("up", 2, 1024),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_set_ip_rejects_conflicts_and_reserved() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).with_ip("10.11.12.2"));
        hv.add_machine("dev2", FakeMachine::new(1, 1024).with_ip("10.11.12.3"));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        assert!(matches!(
            mgr.set_machine_ip("dev2", "10.11.12.2"),
            Err(Error::IpConflict { ref owner, .. }) if owner == "dev1"
        ));
        assert!(matches!(
            mgr.set_machine_ip("dev2", "10.11.12.1"),
            Err(Error::ReservedIp(_))
        ));
        assert!(matches!(
            mgr.set_machine_ip("dev2", "10.11.12"),
            Err(Error::InvalidIp(_))
        ));
        assert!(hv.mutations().is_empty());

        // Re-claiming its own address is fine.
        mgr.set_machine_ip("dev1", "10.11.12.2").unwrap();
    }

    #[test]
    fn test_set_net_type_rewires_when_ip_known() {
        let hv = FakeHypervisor::new();
        hv.add_machine("dev1", FakeMachine::new(1, 1024).with_ip("10.11.12.2"));
        hv.add_machine("bare", FakeMachine::new(1, 1024));
        let shell = FakeShell::new();
        let config = VmcConfig::default();
        let mut mgr = manager(&hv, &shell, &config);

        mgr.set_machine_net_type("bare", NetType::Bridged).unwrap();
        assert_eq!(hv.mutation_ops(), vec!["set_guest_property"]);

        hv.clear_calls();
        mgr.set_machine_net_type("dev1", NetType::Bridged).unwrap();
        assert!(hv.mutations().contains(&"wire_nics(dev1, bridged:en0)".to_string()));
        assert_eq!(mgr.net_type("dev1").unwrap(), NetType::Bridged);
    }
}
