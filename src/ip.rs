//! IPv4 helpers and the /24 address allocator.
//!
//! Every managed VM lives in a /24 host network. The gateway always sits on
//! `.1`, so usable guest addresses run from `.2` to `.254`. Allocation never
//! persists anything; callers commit the returned address themselves.

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::process::{Command, Stdio};

/// Netmask applied to every managed network.
pub const NETMASK: &str = "255.255.255.0";

/// Lowest usable last octet.
pub const FIRST_HOST: u8 = 2;

/// Highest usable last octet.
pub const LAST_HOST: u8 = 254;

/// Number of candidates tried before giving up (one full lap of the subnet).
pub const MAX_ATTEMPTS: usize = (LAST_HOST - FIRST_HOST + 1) as usize;

/// Strict dotted-quad validation.
///
/// Exactly four decimal octets in 0..=255, no leading zeros, no whitespace.
pub fn validate_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// The first three octets of `ip`, e.g. `10.11.12` for `10.11.12.5`.
///
/// Returns `None` if `ip` is not a valid dotted quad.
pub fn subnet_prefix(ip: &str) -> Option<String> {
    let addr: Ipv4Addr = ip.parse().ok()?;
    let [a, b, c, _] = addr.octets();
    Some(format!("{}.{}.{}", a, b, c))
}

/// Broadcast address of the /24 containing `ip`.
pub fn broadcast_for(ip: &str) -> Option<String> {
    subnet_prefix(ip).map(|net| format!("{}.255", net))
}

/// Gateway address of the /24 containing `ip`.
pub fn gateway_for(ip: &str) -> Option<String> {
    subnet_prefix(ip).map(|net| format!("{}.1", net))
}

/// Check that `ip` may be assigned to a guest.
///
/// Rejects malformed addresses and the reserved `.0`, `.1` and `.255` hosts.
pub fn ensure_assignable(ip: &str) -> Result<()> {
    let addr: Ipv4Addr = ip.parse().map_err(|_| Error::InvalidIp(ip.to_string()))?;
    let last = addr.octets()[3];
    if !(FIRST_HOST..=LAST_HOST).contains(&last) {
        return Err(Error::ReservedIp(ip.to_string()));
    }
    Ok(())
}

/// Check that `ip` is usable as a host-only gateway (must end in `.1`).
pub fn ensure_gateway(ip: &str) -> Result<()> {
    let addr: Ipv4Addr = ip.parse().map_err(|_| Error::InvalidIp(ip.to_string()))?;
    if addr.octets()[3] != 1 {
        return Err(Error::network(format!("gateway ip '{}' does not end in .1", ip)));
    }
    Ok(())
}

/// Find the first address not reported as used, starting at `seed`.
///
/// Walks the last octet upwards, wrapping from `.254` back to `.2`. A seed
/// on a reserved host (`.0`, `.1`, `.255`) starts the walk at `.2`. Gives up
/// with [`Error::SubnetExhausted`] after one full lap.
pub fn next_available_ip<F>(seed: &str, mut is_used: F) -> Result<String>
where
    F: FnMut(&str) -> bool,
{
    let addr: Ipv4Addr = seed.parse().map_err(|_| Error::InvalidIp(seed.to_string()))?;
    let [a, b, c, d] = addr.octets();
    let net = format!("{}.{}.{}", a, b, c);

    let mut host = if (FIRST_HOST..=LAST_HOST).contains(&d) {
        d
    } else {
        FIRST_HOST
    };

    for _ in 0..MAX_ATTEMPTS {
        let candidate = format!("{}.{}", net, host);
        if !is_used(&candidate) {
            tracing::debug!(ip = %candidate, "found free address");
            return Ok(candidate);
        }
        host = if host >= LAST_HOST { FIRST_HOST } else { host + 1 };
    }

    Err(Error::SubnetExhausted(net))
}

/// Single ICMP echo against `ip`.
///
/// Only consulted when live probing is enabled in the configuration; the
/// registry's stored properties are the default source of truth.
pub fn ping_probe(ip: &str) -> bool {
    let status = Command::new("ping")
        .args(["-c", "1", "-W", "1", ip])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(s) => s.success(),
        Err(e) => {
            tracing::warn!(ip = %ip, error = %e, "ping probe could not run");
            false
        }
    }
}
