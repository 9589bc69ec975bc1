//! Network subcommands.

use super::parsers::{parse_ip, parse_net_type};
use clap::{Args, Subcommand};
use vmc::network::{self, NetType};
use vmc::vm::MachineState;
use vmc::Context;

/// Manage host networks and VM network types.
#[derive(Subcommand, Debug)]
pub enum NetCmd {
    /// List host network interfaces
    #[command(alias = "ls")]
    List(NetListCmd),
    /// Create a host-only network
    Add(NetAddCmd),
    /// Remove a host-only network
    #[command(aliases = ["delete", "rm"])]
    Del(NetDelCmd),
    /// Set a VM's network type (ho or bri)
    Type(NetTypeCmd),
}

impl NetCmd {
    pub fn run(self, ctx: &Context) -> vmc::Result<()> {
        match self {
            NetCmd::List(cmd) => cmd.run(ctx),
            NetCmd::Add(cmd) => cmd.run(ctx),
            NetCmd::Del(cmd) => cmd.run(ctx),
            NetCmd::Type(cmd) => cmd.run(ctx),
        }
    }
}

#[derive(Args, Debug)]
pub struct NetListCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl NetListCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let nics = network::list(ctx.hypervisor()?)?;

        if self.json {
            let out = serde_json::to_string_pretty(&nics)
                .map_err(|e| vmc::Error::Parse(e.to_string()))?;
            println!("{}", out);
            return Ok(());
        }

        println!(
            "{:<20} {:<10} {:<6} {:<16} {:<16} {:<8}",
            "NAME", "KIND", "DHCP", "IP", "NETMASK", "STATUS"
        );
        for nic in nics {
            println!(
                "{:<20} {:<10} {:<6} {:<16} {:<16} {:<8}",
                super::truncate(&nic.name, 18),
                nic.kind,
                if nic.dhcp { "yes" } else { "no" },
                nic.ip,
                nic.netmask,
                nic.status
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct NetAddCmd {
    /// Gateway address of the new network (must end in .1).
    #[arg(value_parser = parse_ip)]
    pub gateway: String,
}

impl NetAddCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let name = network::add_host_only(ctx.hypervisor()?, &self.gateway)?;
        println!("Created host-only network '{}' ({})", name, self.gateway);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct NetDelCmd {
    /// Host-only network name (e.g. vboxnet0).
    pub name: String,

    /// Force removal without confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl NetDelCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        if !self.force && !super::confirm(&format!("Remove host-only network '{}'?", self.name)) {
            println!("Cancelled");
            return Ok(());
        }
        network::remove_host_only(ctx.hypervisor()?, &self.name)?;
        println!("Removed host-only network '{}'", self.name);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct NetTypeCmd {
    /// VM name.
    pub vm: String,

    /// `ho` (host-only + NAT) or `bri` (bridged).
    #[arg(value_parser = parse_net_type)]
    pub nettype: NetType,
}

impl NetTypeCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        manager.require(&self.vm)?;

        let state = manager.state(&self.vm)?;
        if state != MachineState::PoweredOff {
            return Err(vmc::Error::invalid_state(&self.vm, "powered off", state.name()));
        }

        manager.set_machine_net_type(&self.vm, self.nettype)?;
        println!("VM '{}' network type set to {}", self.vm, self.nettype);
        Ok(())
    }
}
