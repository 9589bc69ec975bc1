//! Error types for vmc.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using vmc's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vmc operations.
#[derive(Error, Debug)]
pub enum Error {
    // Machine lifecycle errors
    /// Machine is not registered with the hypervisor.
    #[error("vm '{0}' is not registered")]
    MachineNotFound(String),

    /// A machine with this name is already registered.
    #[error("there's already a vm registered as '{0}'")]
    MachineExists(String),

    /// Machine name violates the naming contract.
    #[error("invalid vm name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Machine is in an invalid state for the requested operation.
    #[error("vm '{name}' is {actual}, expected {expected}")]
    InvalidState {
        /// Machine name.
        name: String,
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// Machine did not power off within both shutdown phases.
    #[error("vm '{0}' is still running after graceful and forced shutdown")]
    StopTimeout(String),

    /// Machine did not reach the running state after launch.
    #[error("vm '{0}' failed to start")]
    StartFailed(String),

    /// Argument outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough host resources for the requested allocation.
    #[error("host capacity exceeded: {0}")]
    HostCapacity(String),

    // Hypervisor errors
    /// The hypervisor automation tool is not available.
    #[error("hypervisor unavailable: {0}")]
    HypervisorUnavailable(String),

    /// External command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message (usually the tool's stderr).
        message: String,
    },

    /// Hypervisor output could not be interpreted.
    #[error("unexpected hypervisor output: {0}")]
    Parse(String),

    // Address errors
    /// String is not a dotted-quad IPv4 address.
    #[error("'{0}' is not a valid IP")]
    InvalidIp(String),

    /// Address is reserved (gateway, network or broadcast).
    #[error("ip '{0}' is reserved for gateway devices")]
    ReservedIp(String),

    /// Address is already assigned to another machine.
    #[error("ip '{ip}' is already taken by vm '{owner}'")]
    IpConflict {
        /// The contested address.
        ip: String,
        /// Machine currently holding it.
        owner: String,
    },

    /// Every usable address in the /24 is taken.
    #[error("no free address left in subnet {0}.0/24")]
    SubnetExhausted(String),

    // Network errors
    /// Host network configuration error.
    #[error("network error: {0}")]
    Network(String),

    // Image errors
    /// Generic image error.
    #[error("image error: {0}")]
    Image(String),

    /// Image file does not exist.
    #[error("image not found: {}", path.display())]
    ImageNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    // Guest access errors
    /// Remote shell or copy failure.
    #[error("guest access failed: {0}")]
    Guest(String),

    // Provisioning errors
    /// Provisioning file failed validation.
    #[error("provisioning error: {0}")]
    Provision(String),

    // Configuration errors
    /// Failed to load configuration.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Failed to save configuration.
    #[error("failed to save config: {0}")]
    ConfigSave(String),

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an image error with a message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a network error with a message.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a provisioning error with a message.
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    /// Create a guest access error with a message.
    pub fn guest(msg: impl Into<String>) -> Self {
        Self::Guest(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages should include context that helps users fix the problem.

    #[test]
    fn test_machine_not_found_includes_name() {
        let err = Error::MachineNotFound("dev1".to_string());
        assert!(err.to_string().contains("dev1"), "Error should include VM name");
    }

    #[test]
    fn test_ip_conflict_includes_ip_and_owner() {
        let err = Error::IpConflict {
            ip: "10.11.12.2".to_string(),
            owner: "dev2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.11.12.2"), "Error should include the address");
        assert!(msg.contains("dev2"), "Error should include the holder");
    }

    #[test]
    fn test_command_failed_includes_command_and_message() {
        let err = Error::command_failed("VBoxManage startvm", "machine is locked");
        let msg = err.to_string();
        assert!(msg.contains("startvm"), "Error should include command name");
        assert!(msg.contains("locked"), "Error should include error message");
    }

    #[test]
    fn test_invalid_state_includes_both_states() {
        let err = Error::invalid_state("dev1", "powered off", "running");
        let msg = err.to_string();
        assert!(msg.contains("dev1"));
        assert!(msg.contains("powered off"), "Error should include expected state");
        assert!(msg.contains("running"), "Error should include actual state");
    }

    #[test]
    fn test_image_not_found_includes_path() {
        let err = Error::ImageNotFound {
            path: PathBuf::from("/home/me/.vmc/centos.ova"),
        };
        assert!(err.to_string().contains("centos.ova"));
    }

    #[test]
    fn test_subnet_exhausted_names_subnet() {
        let err = Error::SubnetExhausted("10.11.12".to_string());
        assert!(err.to_string().contains("10.11.12.0/24"));
    }
}
