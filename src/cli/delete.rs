//! Delete command implementation.

use clap::Args;
use vmc::Context;

/// Delete a VM and its disks.
#[derive(Args, Debug)]
pub struct DeleteCmd {
    /// VM name to delete.
    pub name: String,

    /// Force deletion without confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl DeleteCmd {
    /// Execute the delete command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        manager.require(&self.name)?;

        if !self.force && !super::confirm(&format!("Delete VM '{}' and its disks?", self.name)) {
            println!("Cancelled");
            return Ok(());
        }

        manager.delete_machine(&self.name)?;
        println!("Deleted VM '{}'", self.name);
        Ok(())
    }
}
