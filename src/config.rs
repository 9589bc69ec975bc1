//! Global vmc configuration.
//!
//! Settings live in `<config_dir>/vmc/config.toml`. A missing file is
//! created with the defaults so users have something to edit.

use crate::error::{Error, Result};
use crate::vm::ShutdownPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name for config file storage.
const APP_NAME: &str = "vmc";

/// Config file stem inside the application directory.
const CONFIG_NAME: &str = "config";

/// Directory under the user's home holding images and the ssh key.
const STORE_DIR: &str = ".vmc";

/// Global vmc configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmcConfig {
    /// Configuration format version.
    pub version: u8,

    /// First address tried when a new machine needs one.
    pub default_ip: String,

    /// Guest account used for ssh and scp.
    pub vm_user: String,

    /// Hypervisor automation tool executable.
    pub vboxmanage: String,

    /// Image store and key directory (default `~/.vmc`).
    pub home: Option<PathBuf>,

    /// Private key for guest access (default `<home>/id_vmc`).
    pub ssh_key: Option<PathBuf>,

    /// Also ping candidate addresses during allocation.
    pub probe_live_ips: bool,

    /// CPUs kept free for the host when resizing machines.
    pub host_cpu_reserve: u32,

    /// Memory in MB kept free for the host when resizing machines.
    pub host_memory_reserve_mb: u64,

    /// Bound on each shutdown phase, humantime format (e.g. `3s`).
    pub shutdown_timeout: String,
}

impl Default for VmcConfig {
    fn default() -> Self {
        Self {
            version: 1,
            default_ip: "10.11.12.2".to_string(),
            vm_user: "vmuser".to_string(),
            vboxmanage: "VBoxManage".to_string(),
            home: None,
            ssh_key: None,
            probe_live_ips: false,
            host_cpu_reserve: 2,
            host_memory_reserve_mb: 8192,
            shutdown_timeout: "3s".to_string(),
        }
    }
}

impl VmcConfig {
    /// Path of the config file.
    pub fn path() -> Result<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
            .map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load configuration from disk.
    ///
    /// If the configuration file doesn't exist, it is created with the defaults.
    pub fn load() -> Result<Self> {
        confy::load(APP_NAME, CONFIG_NAME).map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        confy::load_path(path).map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        confy::store(APP_NAME, CONFIG_NAME, self).map_err(|e| Error::ConfigSave(e.to_string()))
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        confy::store_path(path, self).map_err(|e| Error::ConfigSave(e.to_string()))
    }

    /// Image store directory.
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        dirs::home_dir()
            .map(|h| h.join(STORE_DIR))
            .ok_or_else(|| Error::ConfigLoad("cannot determine home directory".into()))
    }

    /// Private key used for guest access.
    pub fn ssh_key_path(&self) -> Result<PathBuf> {
        match &self.ssh_key {
            Some(key) => Ok(key.clone()),
            None => Ok(self.store_dir()?.join("id_vmc")),
        }
    }

    /// Parsed shutdown phase bound.
    pub fn shutdown_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.shutdown_timeout).map_err(|e| {
            Error::ConfigLoad(format!(
                "invalid shutdown_timeout '{}': {}",
                self.shutdown_timeout, e
            ))
        })
    }

    /// Shutdown policy derived from `shutdown_timeout`.
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        match self.shutdown_timeout() {
            Ok(timeout) => ShutdownPolicy::with_timeout(timeout),
            Err(e) => {
                tracing::warn!(error = %e, "using default shutdown policy");
                ShutdownPolicy::default()
            }
        }
    }
}
