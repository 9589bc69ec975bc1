//! Info command implementation.

use clap::Args;
use vmc::Context;

/// Show a VM's settings and guest properties.
#[derive(Args, Debug)]
pub struct InfoCmd {
    /// VM name.
    pub name: String,
}

impl InfoCmd {
    /// Execute the info command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let manager = ctx.manager()?;
        manager.require(&self.name)?;
        let hv = manager.hypervisor();

        for (key, value) in hv.machine_details(&self.name)? {
            println!("{:<32} {}", key, value);
        }

        let props: Vec<_> = hv
            .guest_properties(&self.name)?
            .into_iter()
            .filter(|(k, _)| k.starts_with("/vm/"))
            .collect();
        if !props.is_empty() {
            println!();
            for (key, value) in props {
                println!("{:<32} {}", key, value);
            }
        }
        Ok(())
    }
}
