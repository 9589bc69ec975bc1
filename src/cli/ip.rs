//! Ip command implementation.

use super::parsers::parse_ip;
use clap::Args;
use vmc::Context;

/// Assign an IP address to a powered-off VM.
#[derive(Args, Debug)]
pub struct IpCmd {
    /// VM name.
    pub name: String,

    /// New address (must not end in .1).
    #[arg(value_parser = parse_ip)]
    pub ip: String,
}

impl IpCmd {
    /// Execute the ip command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        manager.require(&self.name)?;

        let state = manager.state(&self.name)?;
        if state.is_running() {
            return Err(vmc::Error::invalid_state(&self.name, "not running", state.name()));
        }

        manager.set_machine_ip(&self.name, &self.ip)?;
        println!("VM '{}' now has ip {}", self.name, self.ip);
        Ok(())
    }
}
