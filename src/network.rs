//! Host network selection for managed machines.
//!
//! Guests are attached either to a host-only /24 (NAT on the first NIC for
//! outbound traffic) or bridged onto the host's main physical interface.

use crate::error::{Error, Result};
use crate::hypervisor::{HostInterface, Hypervisor, InterfaceKind, NicWiring};
use crate::ip;
use serde::Serialize;
use std::str::FromStr;

/// Network attachment type stored in the `/vm/nettype` guest property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    /// Host-only network plus NAT.
    #[default]
    HostOnly,
    /// Bridged onto the host's main NIC.
    Bridged,
}

impl NetType {
    /// Short form used in guest properties and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetType::HostOnly => "ho",
            NetType::Bridged => "bri",
        }
    }
}

impl std::fmt::Display for NetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ho" | "hostonly" => Ok(NetType::HostOnly),
            "bri" | "bridged" => Ok(NetType::Bridged),
            other => Err(Error::network(format!(
                "invalid network type '{}' (expected 'ho' or 'bri')",
                other
            ))),
        }
    }
}

/// List every host interface the hypervisor knows about.
pub fn list(hv: &dyn Hypervisor) -> Result<Vec<HostInterface>> {
    hv.host_interfaces()
}

/// The host's main NIC: first bridgeable `en*`/`eth*` interface with an address.
pub fn main_nic(hv: &dyn Hypervisor) -> Result<HostInterface> {
    hv.host_interfaces()?
        .into_iter()
        .find(|nic| {
            nic.kind == InterfaceKind::Bridged
                && (nic.name.starts_with("en") || nic.name.starts_with("eth"))
                && !nic.ip.is_empty()
                && nic.ip != "0.0.0.0"
        })
        .ok_or_else(|| Error::network("no usable host interface to bridge to"))
}

/// Host-only adapter serving the /24 identified by `prefix`, if any.
pub fn host_only_for_subnet(hv: &dyn Hypervisor, prefix: &str) -> Result<Option<HostInterface>> {
    Ok(hv.host_interfaces()?.into_iter().find(|nic| {
        nic.kind == InterfaceKind::HostOnly
            && ip::subnet_prefix(&nic.ip).as_deref() == Some(prefix)
    }))
}

/// Name of the host-only adapter for `guest_ip`'s subnet, creating it when missing.
pub fn ensure_host_only(hv: &dyn Hypervisor, guest_ip: &str) -> Result<String> {
    let prefix =
        ip::subnet_prefix(guest_ip).ok_or_else(|| Error::InvalidIp(guest_ip.to_string()))?;

    if let Some(nic) = host_only_for_subnet(hv, &prefix)? {
        return Ok(nic.name);
    }

    let gateway = format!("{}.1", prefix);
    tracing::info!(gateway = %gateway, "no host-only network for subnet, creating one");
    hv.create_host_only(&gateway, ip::NETMASK)
}

/// NIC attachment for a guest with address `guest_ip`.
pub fn wiring_for(hv: &dyn Hypervisor, nettype: NetType, guest_ip: &str) -> Result<NicWiring> {
    match nettype {
        NetType::HostOnly => Ok(NicWiring::HostOnly {
            adapter: ensure_host_only(hv, guest_ip)?,
        }),
        NetType::Bridged => Ok(NicWiring::Bridged {
            adapter: main_nic(hv)?.name,
        }),
    }
}

/// Create a host-only network whose gateway is `gateway` (must end in `.1`).
pub fn add_host_only(hv: &dyn Hypervisor, gateway: &str) -> Result<String> {
    ip::ensure_gateway(gateway)?;
    let prefix = ip::subnet_prefix(gateway).ok_or_else(|| Error::InvalidIp(gateway.into()))?;

    if let Some(existing) = host_only_for_subnet(hv, &prefix)? {
        return Err(Error::network(format!(
            "host-only network '{}' already serves {}.0/24",
            existing.name, prefix
        )));
    }

    hv.create_host_only(gateway, ip::NETMASK)
}

/// Remove the host-only network `name`.
pub fn remove_host_only(hv: &dyn Hypervisor, name: &str) -> Result<()> {
    let known = hv
        .host_interfaces()?
        .into_iter()
        .any(|nic| nic.kind == InterfaceKind::HostOnly && nic.name == name);
    if !known {
        return Err(Error::network(format!(
            "'{}' is not a host-only network",
            name
        )));
    }

    tracing::info!(interface = %name, "removing host-only network");
    hv.remove_host_only(name)
}
