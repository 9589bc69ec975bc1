//! Two-phase shutdown.
//!
//! Phase one asks the guest to power itself off over the remote shell.
//! Phase two pulls the plug through the hypervisor. Each phase polls the
//! power state at a fixed interval and stops polling as soon as the machine
//! is no longer running.

use crate::error::{Error, Result};
use crate::guest::RemoteShell;
use crate::hypervisor::Hypervisor;
use std::thread;
use std::time::Duration;

/// In-guest command for the graceful phase.
pub const GUEST_POWEROFF: &str = "sudo poweroff";

/// Polling bounds for each shutdown phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Delay between state checks.
    pub interval: Duration,
    /// Number of delays before a phase gives up.
    pub attempts: u32,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            attempts: 12,
        }
    }
}

impl ShutdownPolicy {
    /// Policy bounding each phase by `timeout` at the default interval.
    pub fn with_timeout(timeout: Duration) -> Self {
        let interval = Self::default().interval;
        let attempts = timeout.as_millis().div_ceil(interval.as_millis());
        Self {
            interval,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        }
    }

    /// Total time a phase may take.
    pub fn phase_bound(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

/// Poll until `name` is no longer running.
///
/// Returns `Ok(true)` once stopped, `Ok(false)` if it is still running after
/// `policy.attempts` waits.
pub fn wait_until_stopped(hv: &dyn Hypervisor, name: &str, policy: &ShutdownPolicy) -> Result<bool> {
    for attempt in 0..=policy.attempts {
        if !hv.machine_state(name)?.is_running() {
            return Ok(true);
        }
        if attempt < policy.attempts {
            thread::sleep(policy.interval);
        }
    }
    Ok(false)
}

/// Stop a running machine.
///
/// `guest_ip` enables the graceful phase; without it only the forced
/// power-down is attempted.
pub fn stop_machine(
    hv: &dyn Hypervisor,
    shell: &dyn RemoteShell,
    name: &str,
    guest_ip: Option<&str>,
    policy: &ShutdownPolicy,
) -> Result<()> {
    if let Some(ip) = guest_ip {
        tracing::info!(vm = %name, ip = %ip, "requesting guest shutdown");
        // The connection drops mid-command on success, so the exit status says nothing.
        if let Err(e) = shell.run(ip, GUEST_POWEROFF, false) {
            tracing::debug!(vm = %name, error = %e, "guest shutdown command returned an error");
        }
        if wait_until_stopped(hv, name, policy)? {
            tracing::info!(vm = %name, "guest shut down");
            return Ok(());
        }
    }

    tracing::info!(vm = %name, "forcing power off");
    if let Err(e) = hv.power_off(name) {
        tracing::warn!(vm = %name, error = %e, "power off request failed");
    }
    if wait_until_stopped(hv, name, policy)? {
        return Ok(());
    }

    Err(Error::StopTimeout(name.to_string()))
}
