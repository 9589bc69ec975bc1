//! List command implementation.

use super::truncate;
use clap::Args;
use vmc::Context;

/// List all VMs.
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListCmd {
    /// Execute the list command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let manager = ctx.manager()?;
        let vms = manager.registry().machines();

        if self.json {
            let out = serde_json::to_string_pretty(vms)
                .map_err(|e| vmc::Error::Parse(e.to_string()))?;
            println!("{}", out);
            return Ok(());
        }

        if vms.is_empty() {
            println!("No VMs found");
            return Ok(());
        }

        println!(
            "{:<24} {:<12} {:<6} {:<10} {:<16}",
            "NAME", "STATE", "CPUS", "MEMORY", "IP"
        );
        println!("{}", "-".repeat(72));

        for vm in vms {
            if !vm.accessible {
                println!("{:<24} {:<12}", truncate(&vm.name, 22), "inaccessible");
                continue;
            }
            println!(
                "{:<24} {:<12} {:<6} {:<10} {:<16}",
                truncate(&vm.name, 22),
                vm.state,
                vm.cpus,
                format!("{} MB", vm.memory_mb),
                vm.ip.as_deref().unwrap_or("-"),
            );
        }

        Ok(())
    }
}
