//! Per-invocation wiring of the production backends.

use crate::config::VmcConfig;
use crate::error::{Error, Result};
use crate::guest::{self, RemoteShell, SshShell};
use crate::hypervisor::{Hypervisor, VBoxManage};
use crate::image::ImageStore;
use crate::vm::Manager;

/// Everything a command needs: settings, hypervisor, guest shell, images.
#[derive(Debug)]
pub struct Context {
    config: VmcConfig,
    hypervisor: VBoxManage,
    shell: SshShell,
    images: ImageStore,
}

impl Context {
    /// Build the production context from settings.
    pub fn new(config: VmcConfig) -> Result<Self> {
        let store = config.store_dir()?;
        let key = config.ssh_key_path()?;
        Ok(Self {
            hypervisor: VBoxManage::new(&config.vboxmanage),
            shell: SshShell::new(config.vm_user.clone(), key),
            images: ImageStore::new(store),
            config,
        })
    }

    /// Settings in effect.
    pub fn config(&self) -> &VmcConfig {
        &self.config
    }

    /// Image store.
    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Hypervisor, checked for availability.
    pub fn hypervisor(&self) -> Result<&dyn Hypervisor> {
        if !self.hypervisor.is_available() {
            return Err(Error::HypervisorUnavailable(format!(
                "cannot run '{}'; is VirtualBox installed?",
                self.hypervisor.program().display()
            )));
        }
        Ok(&self.hypervisor)
    }

    /// Guest shell, provisioning the access key on first use.
    pub fn shell(&self) -> Result<&dyn RemoteShell> {
        guest::ensure_ssh_keys(&self.config.ssh_key_path()?)?;
        Ok(&self.shell)
    }

    /// Lifecycle manager over a fresh registry snapshot.
    pub fn manager(&self) -> Result<Manager<'_>> {
        Manager::new(self.hypervisor()?, self.shell()?, &self.config)
    }
}
