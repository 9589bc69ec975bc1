//! Desired machine definitions read from a provisioning file.

use super::ini::{Ini, Section};
use crate::error::{Error, Result};
use crate::image::ImageStore;
use crate::ip;
use crate::network::NetType;
use crate::vm::check_name;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default CPU count.
pub const DEFAULT_CPUS: u32 = 1;

/// Default memory in MB.
pub const DEFAULT_MEMORY_MB: u32 = 1024;

/// File copied into the guest after it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    /// Local source.
    pub src: PathBuf,
    /// Destination inside the guest.
    pub dest: String,
}

/// One desired machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    /// Machine name (the section name).
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Address to assign.
    pub netip: String,
    /// Virtual CPUs.
    pub cpus: u32,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Network type.
    pub nettype: NetType,
    /// Optional bootstrap copy.
    pub vmcopy: Option<CopyAction>,
    /// Optional bootstrap command.
    pub vmrun: Option<String>,
}

impl VmSpec {
    /// Minimal spec with defaults for everything optional.
    pub fn new(name: &str, image: &str, netip: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            netip: netip.to_string(),
            cpus: DEFAULT_CPUS,
            memory_mb: DEFAULT_MEMORY_MB,
            nettype: NetType::HostOnly,
            vmcopy: None,
            vmrun: None,
        }
    }

    /// Build a spec from a section, checking field shapes.
    pub fn from_section(section: &Section) -> Result<Self> {
        let name = section.name.as_str();
        let required = |key: &str| {
            section.get(key).ok_or_else(|| {
                Error::provision(format!("[{}] is missing the mandatory '{}' key", name, key))
            })
        };

        let mut spec = Self::new(name, required("image")?, required("netip")?);

        if let Some(cpus) = section.get("cpus") {
            spec.cpus = positive(name, "cpus", cpus)?;
        }
        if let Some(memory) = section.get("memory") {
            spec.memory_mb = positive(name, "memory", memory)?;
        }
        if let Some(nettype) = section.get("nettype") {
            spec.nettype = nettype
                .parse()
                .map_err(|e| Error::provision(format!("[{}] {}", name, e)))?;
        }
        if let Some(copy) = section.get("vmcopy") {
            let parts: Vec<&str> = copy.split_whitespace().collect();
            let [src, dest] = parts.as_slice() else {
                return Err(Error::provision(format!(
                    "[{}] vmcopy needs exactly two parts: '<local source> <guest destination>'",
                    name
                )));
            };
            spec.vmcopy = Some(CopyAction {
                src: PathBuf::from(*src),
                dest: dest.to_string(),
            });
        }
        spec.vmrun = section.get("vmrun").map(str::to_string);

        Ok(spec)
    }

    /// Whether a bootstrap action is configured.
    pub fn has_bootstrap(&self) -> bool {
        self.vmcopy.is_some() || self.vmrun.is_some()
    }
}

fn positive(section: &str, key: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::provision(format!(
            "[{}] '{}' must be a positive integer, got '{}'",
            section, key, value
        ))),
    }
}

/// Parse every section of a provisioning file.
pub fn parse_specs(ini: &Ini) -> Result<Vec<VmSpec>> {
    if ini.sections().is_empty() {
        return Err(Error::provision("no vm sections found"));
    }
    ini.sections().iter().map(VmSpec::from_section).collect()
}

/// Read and parse a provisioning file.
pub fn load_specs(path: &Path) -> Result<Vec<VmSpec>> {
    parse_specs(&Ini::load(path)?)
}

/// Check a whole spec set before anything is touched.
pub fn validate_specs(specs: &[VmSpec], images: &ImageStore) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::provision("no vm sections found"));
    }

    let mut names: HashSet<&str> = HashSet::new();
    let mut ips: HashMap<&str, &str> = HashMap::new();

    for spec in specs {
        check_name(&spec.name).map_err(|e| Error::provision(e.to_string()))?;
        if !names.insert(spec.name.as_str()) {
            return Err(Error::provision(format!("vm '{}' is defined twice", spec.name)));
        }

        ip::ensure_assignable(&spec.netip)
            .map_err(|e| Error::provision(format!("[{}] {}", spec.name, e)))?;
        if let Some(other) = ips.insert(spec.netip.as_str(), spec.name.as_str()) {
            return Err(Error::provision(format!(
                "ip '{}' is used by both '{}' and '{}'",
                spec.netip, other, spec.name
            )));
        }

        images
            .resolve(&spec.image)
            .map_err(|e| Error::provision(format!("[{}] {}", spec.name, e)))?;
    }

    Ok(())
}

/// Template written by `prov --init`.
pub fn skeleton() -> &'static str {
    r#"# vmc provisioning file
#
# One section per vm. Mandatory keys: image, netip.
#   image    image name in ~/.vmc, or a path to an .ova
#   netip    must not end in .1
#   memory   MB
#   nettype  ho (host-only + NAT) or bri (bridged)
#   vmcopy   local file and guest destination, copied after boot
#   vmrun    command run in the guest after boot
#
# [dev1]
# image   = centos.ova
# netip   = 10.11.12.2
# cpus    = 1
# memory  = 1024
# nettype = ho
# vmcopy  = ./setup.sh /tmp/setup.sh
# vmrun   = "sudo sh /tmp/setup.sh"

[dev1]
image = centos.ova
netip = 10.11.12.2
"#
}
