//! Create command implementation.

use clap::Args;
use vmc::Context;

/// Create a VM from an image.
#[derive(Args, Debug)]
pub struct CreateCmd {
    /// Name for the new VM.
    pub name: String,

    /// Image name in the store, or a path to an .ova file.
    pub image: String,
}

impl CreateCmd {
    /// Execute the create command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let image = ctx.images().resolve(&self.image)?;
        let mut manager = ctx.manager()?;

        println!("Creating VM '{}' from {}...", self.name, image.display());
        manager.create_machine(&self.name, &image)?;

        let ip = manager
            .registry()
            .find(&self.name)
            .and_then(|vm| vm.ip.clone())
            .unwrap_or_else(|| "-".to_string());
        println!("Created VM '{}' (ip {})", self.name, ip);
        Ok(())
    }
}
