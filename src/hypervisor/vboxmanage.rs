//! VirtualBox backend driven through the `VBoxManage` command-line tool.
//!
//! Every call spawns the tool, waits for it, and parses its text output.
//! The tool blocks on the hypervisor's progress objects itself, so imports,
//! exports and power transitions are synchronous from our side.

use super::{
    ApplianceInfo, HostInterface, HostResources, Hypervisor, InterfaceKind, MachineEntry,
    MachineInfo, NicWiring,
};
use crate::error::{Error, Result};
use crate::vm::{Frontend, MachineState};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Default executable name.
pub const DEFAULT_PROGRAM: &str = "VBoxManage";

/// Marker the tool prints when a machine name does not resolve.
const NOT_FOUND_MARKER: &str = "Could not find a registered machine";

/// Description prefixes dropped from imported appliances.
const IGNORED_DESCRIPTIONS: &[&str] = &[
    "Floppy",
    "CD-ROM",
    "USB controller",
    "Sound card",
    "IDE controller",
    "SCSI controller",
];

/// VBoxManage-backed hypervisor.
#[derive(Debug, Clone)]
pub struct VBoxManage {
    program: PathBuf,
}

impl Default for VBoxManage {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl VBoxManage {
    /// Create a backend using the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path to the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Run the tool and return stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        self.run_inner(None, args)
    }

    /// Run the tool against a machine, mapping "not registered" errors.
    fn run_for(&self, machine: &str, args: &[&str]) -> Result<String> {
        self.run_inner(Some(machine), args)
    }

    fn run_inner(&self, machine: Option<&str>, args: &[&str]) -> Result<String> {
        let label = format!("{} {}", self.program.display(), args.join(" "));
        tracing::debug!(command = %label, "running hypervisor command");

        let output = self
            .command()
            .args(args)
            .output()
            .map_err(|e| Error::command_failed(&label, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if let Some(name) = machine {
                if stderr.contains(NOT_FOUND_MARKER) {
                    return Err(Error::MachineNotFound(name.to_string()));
                }
            }
            return Err(Error::command_failed(label, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn modifyvm(&self, name: &str, settings: &[&str]) -> Result<()> {
        let mut args = vec!["modifyvm", name];
        args.extend_from_slice(settings);
        self.run_for(name, &args).map(|_| ())
    }
}

impl Hypervisor for VBoxManage {
    fn name(&self) -> &'static str {
        "virtualbox"
    }

    fn is_available(&self) -> bool {
        self.command()
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn list_machines(&self) -> Result<Vec<MachineEntry>> {
        let out = self.run(&["list", "vms"])?;
        Ok(parse_vm_list(&out))
    }

    fn machine_info(&self, name: &str) -> Result<MachineInfo> {
        let pairs = parse_machine_readable(&self.machine_readable(name)?);
        machine_info_from_pairs(name, &pairs)
    }

    fn machine_state(&self, name: &str) -> Result<MachineState> {
        self.machine_info(name).map(|info| info.state)
    }

    fn machine_details(&self, name: &str) -> Result<Vec<(String, String)>> {
        Ok(parse_machine_readable(&self.machine_readable(name)?))
    }

    fn guest_property(&self, name: &str, key: &str) -> Result<Option<String>> {
        let out = self.run_for(name, &["guestproperty", "get", name, key])?;
        Ok(parse_guest_property(&out))
    }

    fn set_guest_property(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.run_for(name, &["guestproperty", "set", name, key, value])
            .map(|_| ())
    }

    fn guest_properties(&self, name: &str) -> Result<Vec<(String, String)>> {
        let out = self.run_for(name, &["guestproperty", "enumerate", name])?;
        Ok(parse_guest_properties(&out))
    }

    fn inspect_appliance(&self, path: &Path) -> Result<ApplianceInfo> {
        let path = path.to_string_lossy();
        let out = self.run(&["import", &path, "--dry-run"])?;
        Ok(parse_import_dry_run(&out))
    }

    fn import_appliance(&self, name: &str, path: &Path, ignored_units: &[u32]) -> Result<()> {
        let path = path.to_string_lossy();
        let units: Vec<String> = ignored_units.iter().map(|u| u.to_string()).collect();

        let mut args: Vec<&str> = vec![
            "import", &path, "--vsys", "0", "--vmname", name, "--cpus", "1", "--memory", "1024",
        ];
        for unit in &units {
            args.extend_from_slice(&["--vsys", "0", "--unit", unit, "--ignore"]);
        }

        tracing::info!(vm = %name, image = %path, "importing appliance");
        self.run(&args).map(|_| ())
    }

    fn export_appliance(&self, name: &str, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        tracing::info!(vm = %name, image = %path, "exporting appliance");
        self.run_for(name, &["export", name, "--output", &path, "--ovf20"])
            .map(|_| ())
    }

    fn start(&self, name: &str, frontend: Frontend) -> Result<()> {
        self.run_for(name, &["startvm", name, "--type", frontend.as_str()])
            .map(|_| ())
    }

    fn power_off(&self, name: &str) -> Result<()> {
        self.run_for(name, &["controlvm", name, "poweroff"]).map(|_| ())
    }

    fn unregister_and_delete(&self, name: &str) -> Result<()> {
        self.run_for(name, &["unregistervm", name, "--delete"])
            .map(|_| ())
    }

    fn set_boot_disk_only(&self, name: &str) -> Result<()> {
        self.modifyvm(
            name,
            &["--boot1", "disk", "--boot2", "none", "--boot3", "none", "--boot4", "none"],
        )
    }

    fn set_cpus(&self, name: &str, cpus: u32) -> Result<()> {
        self.modifyvm(name, &["--cpus", &cpus.to_string()])
    }

    fn set_memory(&self, name: &str, memory_mb: u32) -> Result<()> {
        self.modifyvm(name, &["--memory", &memory_mb.to_string()])
    }

    fn wire_nics(&self, name: &str, wiring: &NicWiring) -> Result<()> {
        match wiring {
            NicWiring::HostOnly { adapter } => self.modifyvm(
                name,
                &[
                    "--nic1",
                    "nat",
                    "--nictype1",
                    "virtio",
                    "--natdnspassdomain1",
                    "on",
                    "--natdnshostresolver1",
                    "on",
                    "--nic2",
                    "hostonly",
                    "--nictype2",
                    "virtio",
                    "--hostonlyadapter2",
                    adapter,
                ],
            ),
            NicWiring::Bridged { adapter } => self.modifyvm(
                name,
                &[
                    "--nic1",
                    "none",
                    "--nic2",
                    "bridged",
                    "--nictype2",
                    "virtio",
                    "--bridgeadapter2",
                    adapter,
                ],
            ),
        }
    }

    fn host_interfaces(&self) -> Result<Vec<HostInterface>> {
        let mut all = parse_host_interfaces(
            &self.run(&["list", "bridgedifs"])?,
            InterfaceKind::Bridged,
        );
        all.extend(parse_host_interfaces(
            &self.run(&["list", "hostonlyifs"])?,
            InterfaceKind::HostOnly,
        ));
        Ok(all)
    }

    fn create_host_only(&self, gateway: &str, netmask: &str) -> Result<String> {
        let out = self.run(&["hostonlyif", "create"])?;
        let name = parse_created_interface(&out)
            .ok_or_else(|| Error::network("error creating new host-only network"))?;

        self.run(&["hostonlyif", "ipconfig", &name, "--ip", gateway, "--netmask", netmask])?;

        tracing::info!(interface = %name, gateway = %gateway, "created host-only network");
        Ok(name)
    }

    fn remove_host_only(&self, name: &str) -> Result<()> {
        self.run(&["hostonlyif", "remove", name]).map(|_| ())
    }

    fn host_resources(&self) -> Result<HostResources> {
        let out = self.run(&["list", "hostinfo"])?;
        parse_host_info(&out)
    }
}

impl VBoxManage {
    fn machine_readable(&self, name: &str) -> Result<String> {
        self.run_for(name, &["showvminfo", name, "--machinereadable"])
    }
}

// ============================================================================
// Output parsers
// ============================================================================

/// Parse `list vms` output: one `"name" {uuid}` per line.
pub(crate) fn parse_vm_list(out: &str) -> Vec<MachineEntry> {
    out.lines()
        .filter_map(|line| {
            let line = line.trim();
            let open = line.rfind('{')?;
            let close = line.rfind('}')?;
            if !line.starts_with('"') || close < open {
                return None;
            }
            let name = line[..open].trim().trim_matches('"').to_string();
            let uuid = line[open + 1..close].to_string();
            let accessible = name != "<inaccessible>";
            Some(MachineEntry {
                name,
                uuid,
                accessible,
            })
        })
        .collect()
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^"?(?P<key>[^"=]+)"?="?(?P<val>.*?)"?$"#).expect("static regex")
    })
}

/// Parse `--machinereadable` output into ordered key/value pairs.
///
/// Continuation lines of multi-line values (descriptions) are skipped.
pub(crate) fn parse_machine_readable(out: &str) -> Vec<(String, String)> {
    out.lines()
        .filter_map(|line| {
            let caps = key_value_re().captures(line.trim_end())?;
            Some((caps["key"].to_string(), caps["val"].to_string()))
        })
        .collect()
}

fn machine_info_from_pairs(name: &str, pairs: &[(String, String)]) -> Result<MachineInfo> {
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let number = |key: &str| -> Result<u32> {
        get(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::Parse(format!("missing or invalid '{}' for vm '{}'", key, name)))
    };

    Ok(MachineInfo {
        name: get("name").unwrap_or(name).to_string(),
        uuid: get("UUID").unwrap_or_default().to_string(),
        os_type: get("ostype").unwrap_or_default().to_string(),
        cpus: number("cpus")?,
        memory_mb: number("memory")?,
        state: MachineState::from_vboxmanage(get("VMState").unwrap_or("unknown")),
    })
}

/// Parse `guestproperty get` output.
pub(crate) fn parse_guest_property(out: &str) -> Option<String> {
    let value = out.trim().strip_prefix("Value:")?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn guest_props_re() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            // 6.x: Name: /vm/ip, value: 10.11.12.2, timestamp: 1, flags:
            Regex::new(r"^Name: (?P<key>[^,]+), value: (?P<val>.*?), timestamp:")
                .expect("static regex"),
            // 7.x: /vm/ip = '10.11.12.2' @ 2024-01-01T00:00:00Z
            Regex::new(r"^(?P<key>\S+)\s+= '(?P<val>.*)'").expect("static regex"),
        )
    })
}

/// Parse `guestproperty enumerate` output (both 6.x and 7.x layouts).
pub(crate) fn parse_guest_properties(out: &str) -> Vec<(String, String)> {
    let (old, new) = guest_props_re();
    out.lines()
        .filter_map(|line| {
            let line = line.trim();
            let caps = old.captures(line).or_else(|| new.captures(line))?;
            Some((caps["key"].to_string(), caps["val"].to_string()))
        })
        .collect()
}

fn dry_run_re() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^Virtual system \d+:").expect("static regex"),
            Regex::new(r"(?m)^\s*(?P<unit>\d+):\s*(?P<desc>.+)$").expect("static regex"),
        )
    })
}

/// Parse `import --dry-run` output.
pub(crate) fn parse_import_dry_run(out: &str) -> ApplianceInfo {
    let (system, unit) = dry_run_re();
    let systems = system.find_iter(out).count();
    let ignored_units = unit
        .captures_iter(out)
        .filter(|c| {
            let desc = c["desc"].trim_start();
            IGNORED_DESCRIPTIONS.iter().any(|p| desc.starts_with(p))
        })
        .filter_map(|c| c["unit"].parse().ok())
        .collect();

    ApplianceInfo {
        systems,
        ignored_units,
    }
}

/// Parse `list bridgedifs` / `list hostonlyifs` output (blank-line separated blocks).
pub(crate) fn parse_host_interfaces(out: &str, kind: InterfaceKind) -> Vec<HostInterface> {
    let mut result = Vec::new();
    let mut current: Option<HostInterface> = None;

    for line in out.lines() {
        let Some((key, value)) = line.split_once(':') else {
            if line.trim().is_empty() {
                result.extend(current.take());
            }
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Name" => {
                result.extend(current.take());
                current = Some(HostInterface {
                    name: value,
                    kind,
                    dhcp: false,
                    ip: String::new(),
                    netmask: String::new(),
                    status: "Unknown".to_string(),
                });
            }
            "DHCP" => {
                if let Some(nic) = current.as_mut() {
                    nic.dhcp = value.eq_ignore_ascii_case("enabled");
                }
            }
            "IPAddress" => {
                if let Some(nic) = current.as_mut() {
                    nic.ip = value;
                }
            }
            "NetworkMask" => {
                if let Some(nic) = current.as_mut() {
                    nic.netmask = value;
                }
            }
            "Status" => {
                if let Some(nic) = current.as_mut() {
                    nic.status = value;
                }
            }
            _ => {}
        }
    }
    result.extend(current);
    result
}

/// Extract the adapter name from `hostonlyif create` output.
pub(crate) fn parse_created_interface(out: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Interface '([^']+)'").expect("static regex"));
    re.captures(out).map(|c| c[1].to_string())
}

/// Parse `list hostinfo` output.
pub(crate) fn parse_host_info(out: &str) -> Result<HostResources> {
    let field = |label: &str| {
        out.lines()
            .find_map(|l| l.trim().strip_prefix(label))
            .and_then(|v| v.split_whitespace().next())
            .and_then(|v| v.parse::<u64>().ok())
    };

    let cpus = field("Processor online count:")
        .ok_or_else(|| Error::Parse("host processor count not reported".into()))?;
    let cpus = u32::try_from(cpus)
        .map_err(|_| Error::Parse(format!("host processor count out of range: {}", cpus)))?;
    let memory = field("Memory available:")
        .ok_or_else(|| Error::Parse("host available memory not reported".into()))?;

    Ok(HostResources {
        cpus_online: cpus,
        memory_available_mb: memory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_uses_configured_program() {
        let vbox = VBoxManage::new("/opt/vbox/VBoxManage");
        assert_eq!(vbox.command().get_program(), "/opt/vbox/VBoxManage");
    }

    #[test]
    fn test_parse_vm_list() {
        let out = r#""dev1" {0c4a2d33-1111-4e2b-9f51-9a0a1d0e1f01}
"my vm" {0c4a2d33-2222-4e2b-9f51-9a0a1d0e1f02}
"<inaccessible>" {0c4a2d33-3333-4e2b-9f51-9a0a1d0e1f03}
garbage line
"#;
        let vms = parse_vm_list(out);
        assert_eq!(vms.len(), 3);
        assert_eq!(vms[0].name, "dev1");
        assert_eq!(vms[0].uuid, "0c4a2d33-1111-4e2b-9f51-9a0a1d0e1f01");
        assert!(vms[0].accessible);
        assert_eq!(vms[1].name, "my vm");
        assert!(!vms[2].accessible);
    }

    #[test]
    fn test_parse_machine_readable_and_info() {
        let out = r#"name="dev1"
ostype="RedHat_64"
UUID="0c4a2d33-1111-4e2b-9f51-9a0a1d0e1f01"
memory=2048
cpus=2
VMState="running"
"SATA-0-0"="/home/me/VirtualBox VMs/dev1/hd1.vmdk"
description="first line
second line"
"#;
        let pairs = parse_machine_readable(out);
        assert!(pairs.contains(&("SATA-0-0".into(), "/home/me/VirtualBox VMs/dev1/hd1.vmdk".into())));

        let info = machine_info_from_pairs("dev1", &pairs).unwrap();
        assert_eq!(info.name, "dev1");
        assert_eq!(info.os_type, "RedHat_64");
        assert_eq!(info.cpus, 2);
        assert_eq!(info.memory_mb, 2048);
        assert_eq!(info.state, MachineState::Running);
    }

    #[test]
    fn test_machine_info_requires_cpus() {
        let pairs = parse_machine_readable("name=\"dev1\"\nmemory=1024\n");
        assert!(matches!(
            machine_info_from_pairs("dev1", &pairs),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_guest_property() {
        assert_eq!(
            parse_guest_property("Value: 10.11.12.2\n").as_deref(),
            Some("10.11.12.2")
        );
        assert_eq!(parse_guest_property("No value set!\n"), None);
    }

    #[test]
    fn test_parse_guest_properties_both_layouts() {
        let v6 = "Name: /vm/ip, value: 10.11.12.2, timestamp: 1600000000, flags: \n\
                  Name: /vm/nettype, value: ho, timestamp: 1600000000, flags: \n";
        let v7 = "/vm/ip                        = '10.11.12.2' @ 2024-01-01T00:00:00.000Z\n\
                  /vm/nettype                   = 'ho' @ 2024-01-01T00:00:00.000Z\n";
        for out in [v6, v7] {
            let props = parse_guest_properties(out);
            assert_eq!(
                props,
                vec![
                    ("/vm/ip".to_string(), "10.11.12.2".to_string()),
                    ("/vm/nettype".to_string(), "ho".to_string()),
                ]
            );
        }
    }

    #[test]
    fn test_parse_import_dry_run() {
        let out = r#"Interpreting /home/me/.vmc/centos.ova...
OK.
Virtual system 0:
 0: Suggested OS type: "RedHat_64"
 1: Suggested VM name "centos"
 2: Number of CPUs: 1
 3: Guest memory: 1024 MB
 4: Sound card (appliance expects "", can change on import)
    (disable with "--vsys 0 --unit 4 --ignore")
 5: USB controller
    (disable with "--vsys 0 --unit 5 --ignore")
 6: Network adapter: orig NAT, config 3, extra slot=0;type=NAT
 7: CD-ROM
    (disable with "--vsys 0 --unit 7 --ignore")
 8: IDE controller, type PIIX4
    (disable with "--vsys 0 --unit 8 --ignore")
 9: SATA controller, type AHCI
10: Hard disk image: source image=centos-disk001.vmdk
"#;
        let info = parse_import_dry_run(out);
        assert_eq!(info.systems, 1);
        assert_eq!(info.ignored_units, vec![4, 5, 7, 8]);
    }

    #[test]
    fn test_parse_host_interfaces() {
        let out = "Name:            vboxnet0\n\
                   GUID:            786f6276-656e-4074-8000-0a0027000000\n\
                   DHCP:            Disabled\n\
                   IPAddress:       10.11.12.1\n\
                   NetworkMask:     255.255.255.0\n\
                   Status:          Up\n\
                   \n\
                   Name:            vboxnet1\n\
                   DHCP:            Enabled\n\
                   IPAddress:       192.168.56.1\n\
                   NetworkMask:     255.255.255.0\n\
                   Status:          Down\n";
        let nics = parse_host_interfaces(out, InterfaceKind::HostOnly);
        assert_eq!(nics.len(), 2);
        assert_eq!(nics[0].name, "vboxnet0");
        assert_eq!(nics[0].ip, "10.11.12.1");
        assert!(!nics[0].dhcp);
        assert_eq!(nics[0].status, "Up");
        assert_eq!(nics[1].name, "vboxnet1");
        assert!(nics[1].dhcp);
        assert_eq!(nics[1].kind, InterfaceKind::HostOnly);
    }

    #[test]
    fn test_parse_created_interface() {
        let out = "0%...10%...100%\nInterface 'vboxnet3' was successfully created\n";
        assert_eq!(parse_created_interface(out).as_deref(), Some("vboxnet3"));
        assert_eq!(parse_created_interface("nothing"), None);
    }

    #[test]
    fn test_parse_host_info() {
        let out = "Host Information:\n\nProcessor count: 8\nProcessor online count: 8\n\
                   Memory size: 32768 MByte\nMemory available: 20480 MByte\n";
        let host = parse_host_info(out).unwrap();
        assert_eq!(host.cpus_online, 8);
        assert_eq!(host.memory_available_mb, 20480);
        assert!(parse_host_info("nothing").is_err());
    }

    #[test]
    fn test_parse_host_info_rejects_oversized_cpu_count() {
        let out = "Processor online count: 4294967296
Memory available: 20480 MByte
";
        assert!(matches!(parse_host_info(out), Err(Error::Parse(_))));
    }
}
