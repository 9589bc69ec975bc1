//! Modify command implementation.

use super::parsers::parse_positive;
use clap::Args;
use vmc::Context;

/// Change a powered-off VM's CPU count and memory.
#[derive(Args, Debug)]
pub struct ModifyCmd {
    /// VM name.
    pub name: String,

    /// Number of virtual CPUs.
    #[arg(value_parser = parse_positive)]
    pub cpus: u32,

    /// Memory in MB.
    #[arg(value_parser = parse_positive, default_value = "1024")]
    pub memory: u32,
}

impl ModifyCmd {
    /// Execute the modify command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        manager.modify_machine(&self.name, self.cpus, self.memory)?;
        println!(
            "VM '{}' now has {} cpus and {} MB memory",
            self.name, self.cpus, self.memory
        );
        Ok(())
    }
}
