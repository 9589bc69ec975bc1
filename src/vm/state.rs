//! Machine power state types.

use serde::{Deserialize, Serialize};

/// Power state of a registered machine, as reported by the hypervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// Powered off (never started or cleanly shut down).
    PoweredOff,
    /// State saved to disk.
    Saved,
    /// Process died unexpectedly.
    Aborted,
    /// Up and running.
    Running,
    /// Paused.
    Paused,
    /// Guest stuck (e.g. triple fault).
    Stuck,
    /// Launching.
    Starting,
    /// Shutting down.
    Stopping,
    /// Saving state.
    Saving,
    /// Restoring saved state.
    Restoring,
    /// Any other transient state.
    Other(String),
}

impl MachineState {
    /// Parse the machine-readable `VMState` value.
    pub fn from_vboxmanage(s: &str) -> Self {
        match s.trim().trim_matches('"') {
            "poweroff" => MachineState::PoweredOff,
            "saved" => MachineState::Saved,
            "aborted" => MachineState::Aborted,
            "running" => MachineState::Running,
            "paused" => MachineState::Paused,
            "gurumeditation" | "stuck" => MachineState::Stuck,
            "starting" => MachineState::Starting,
            "stopping" => MachineState::Stopping,
            "saving" => MachineState::Saving,
            "restoring" => MachineState::Restoring,
            other => MachineState::Other(other.to_string()),
        }
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        matches!(self, MachineState::Running)
    }

    /// Get the state name as shown in listings.
    pub fn name(&self) -> &str {
        match self {
            MachineState::PoweredOff => "PoweredOff",
            MachineState::Saved => "Saved",
            MachineState::Aborted => "Aborted",
            MachineState::Running => "Running",
            MachineState::Paused => "Paused",
            MachineState::Stuck => "Stuck",
            MachineState::Starting => "Starting",
            MachineState::Stopping => "Stopping",
            MachineState::Saving => "Saving",
            MachineState::Restoring => "Restoring",
            MachineState::Other(s) => s,
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Front-end used when launching a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frontend {
    /// No window; the default for provisioning.
    #[default]
    Headless,
    /// Desktop window.
    Gui,
}

impl Frontend {
    /// Value passed to the hypervisor's `--type` option.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frontend::Headless => "headless",
            Frontend::Gui => "gui",
        }
    }
}
