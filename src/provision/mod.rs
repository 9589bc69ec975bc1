//! Declarative provisioning.
//!
//! A provisioning file lists the machines that should exist. The
//! [`Reconciler`] walks them in order and, for each one, either creates it,
//! leaves it alone, or stops, reconfigures and restarts it. One machine's
//! failure never stops the others, except for an address collision with a
//! machine outside the file, which aborts the run.

pub mod ini;
pub mod spec;

pub use spec::{load_specs, parse_specs, skeleton, validate_specs, CopyAction, VmSpec};

use crate::error::{Error, Result};
use crate::guest::{self, BOOT_POLL, BOOT_WAIT};
use crate::image::ImageStore;
use crate::registry::MachineRecord;
use crate::vm::{Frontend, Manager};
use std::time::Duration;

/// What reconciliation did to one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Created from its image, configured and started.
    Created,
    /// Already matched and was running; nothing changed.
    AlreadyRunning,
    /// Already matched; started.
    Started,
    /// Settings diverged; stopped, updated and restarted.
    Reconfigured {
        /// Updates that failed (`ip`, `cpus`, `memory`, `nettype`).
        failed_steps: Vec<&'static str>,
    },
    /// Could not be brought to the desired state.
    Failed(String),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::AlreadyRunning => write!(f, "already running"),
            Outcome::Started => write!(f, "started"),
            Outcome::Reconfigured { failed_steps } if failed_steps.is_empty() => {
                write!(f, "reconfigured")
            }
            Outcome::Reconfigured { failed_steps } => {
                write!(f, "reconfigured (failed: {})", failed_steps.join(", "))
            }
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one bootstrap action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStep {
    /// `vmcopy` or `vmrun`.
    pub action: &'static str,
    /// Failure message, if any.
    pub error: Option<String>,
}

/// Per-machine result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecReport {
    /// Machine name.
    pub name: String,
    /// What happened.
    pub outcome: Outcome,
    /// Bootstrap actions run after the machine came up.
    pub bootstrap: Vec<BootstrapStep>,
}

/// Drives machines toward a set of [`VmSpec`]s.
pub struct Reconciler<'m, 'a> {
    manager: &'m mut Manager<'a>,
    images: &'m ImageStore,
    boot_wait: Duration,
    boot_poll: Duration,
}

impl<'m, 'a> Reconciler<'m, 'a> {
    /// Create a reconciler.
    pub fn new(manager: &'m mut Manager<'a>, images: &'m ImageStore) -> Self {
        Self {
            manager,
            images,
            boot_wait: BOOT_WAIT,
            boot_poll: BOOT_POLL,
        }
    }

    /// Override how long to wait for a guest before bootstrapping it.
    pub fn with_boot_wait(mut self, timeout: Duration, interval: Duration) -> Self {
        self.boot_wait = timeout;
        self.boot_poll = interval;
        self
    }

    /// Validate `specs`, then bring each machine to its desired state.
    pub fn reconcile(&mut self, specs: &[VmSpec]) -> Result<Vec<SpecReport>> {
        validate_specs(specs, self.images)?;

        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            let outcome = match self.apply(spec) {
                Ok(outcome) => outcome,
                Err(e @ Error::IpConflict { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(vm = %spec.name, error = %e, "provisioning failed");
                    Outcome::Failed(e.to_string())
                }
            };
            tracing::info!(vm = %spec.name, outcome = %outcome, "provisioned");

            let bootstrap = if matches!(outcome, Outcome::Failed(_)) || !spec.has_bootstrap() {
                Vec::new()
            } else {
                self.bootstrap(spec)
            };

            reports.push(SpecReport {
                name: spec.name.clone(),
                outcome,
                bootstrap,
            });
        }
        Ok(reports)
    }

    fn apply(&mut self, spec: &VmSpec) -> Result<Outcome> {
        match self.manager.registry().find(&spec.name).cloned() {
            None => self.create(spec),
            Some(record) if matches_spec(&record, spec) => self.ensure_running(spec),
            Some(record) => self.reconfigure(spec, &record),
        }
    }

    fn check_ip_free(&self, spec: &VmSpec) -> Result<()> {
        match self
            .manager
            .registry()
            .ip_holder(&spec.netip, Some(&spec.name))
        {
            Some(owner) => Err(Error::IpConflict {
                ip: spec.netip.clone(),
                owner: owner.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn create(&mut self, spec: &VmSpec) -> Result<Outcome> {
        self.check_ip_free(spec)?;
        let image = self.images.resolve(&spec.image)?;

        let name = spec.name.as_str();
        self.manager.create_machine(name, &image)?;
        self.manager.set_machine_net_type(name, spec.nettype)?;
        self.manager.set_machine_ip(name, &spec.netip)?;

        let hv = self.manager.hypervisor();
        hv.set_cpus(name, spec.cpus)?;
        hv.set_memory(name, spec.memory_mb)?;
        self.manager.refresh()?;

        self.manager.start_machine(name, Frontend::Headless)?;
        Ok(Outcome::Created)
    }

    fn ensure_running(&mut self, spec: &VmSpec) -> Result<Outcome> {
        if self.manager.state(&spec.name)?.is_running() {
            return Ok(Outcome::AlreadyRunning);
        }
        self.manager.start_machine(&spec.name, Frontend::Headless)?;
        Ok(Outcome::Started)
    }

    fn reconfigure(&mut self, spec: &VmSpec, current: &MachineRecord) -> Result<Outcome> {
        let name = spec.name.as_str();
        tracing::info!(vm = %name, "settings diverge, reconfiguring");

        let ip_changes = current.ip.as_deref() != Some(spec.netip.as_str());
        if ip_changes {
            self.check_ip_free(spec)?;
        }

        if self.manager.state(name)?.is_running() {
            self.manager.stop_machine(name, true)?;
        }

        let mut failed_steps = Vec::new();
        let hv = self.manager.hypervisor();

        if ip_changes {
            if let Err(e) = self.manager.set_machine_ip(name, &spec.netip) {
                tracing::warn!(vm = %name, error = %e, "failed to update ip");
                failed_steps.push("ip");
            }
        }
        if current.cpus != spec.cpus {
            if let Err(e) = hv.set_cpus(name, spec.cpus) {
                tracing::warn!(vm = %name, error = %e, "failed to update cpus");
                failed_steps.push("cpus");
            }
        }
        if current.memory_mb != spec.memory_mb {
            if let Err(e) = hv.set_memory(name, spec.memory_mb) {
                tracing::warn!(vm = %name, error = %e, "failed to update memory");
                failed_steps.push("memory");
            }
        }
        if let Err(e) = self.manager.set_machine_net_type(name, spec.nettype) {
            tracing::warn!(vm = %name, error = %e, "failed to update network type");
            failed_steps.push("nettype");
        }

        self.manager.refresh()?;
        self.manager.start_machine(name, Frontend::Headless)?;
        Ok(Outcome::Reconfigured { failed_steps })
    }

    fn bootstrap(&self, spec: &VmSpec) -> Vec<BootstrapStep> {
        let shell = self.manager.shell();
        let ip = spec.netip.as_str();
        let reachable = guest::wait_for_port(shell, ip, self.boot_wait, self.boot_poll);
        let unreachable = || Some(format!("guest {} not reachable over ssh", ip));

        let mut steps = Vec::new();
        if let Some(copy) = &spec.vmcopy {
            let error = if reachable {
                shell
                    .copy(ip, &copy.src, &copy.dest, true)
                    .err()
                    .map(|e| e.to_string())
            } else {
                unreachable()
            };
            steps.push(BootstrapStep {
                action: "vmcopy",
                error,
            });
        }
        if let Some(command) = &spec.vmrun {
            let error = if reachable {
                shell.run(ip, command, true).err().map(|e| e.to_string())
            } else {
                unreachable()
            };
            steps.push(BootstrapStep {
                action: "vmrun",
                error,
            });
        }

        for step in steps.iter().filter(|s| s.error.is_some()) {
            tracing::warn!(vm = %spec.name, action = step.action, error = ?step.error, "bootstrap step failed");
        }
        steps
    }
}

fn matches_spec(record: &MachineRecord, spec: &VmSpec) -> bool {
    record.ip.as_deref() == Some(spec.netip.as_str())
        && record.cpus == spec.cpus
        && record.memory_mb == spec.memory_mb
}
