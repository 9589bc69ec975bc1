//! Ssh command implementation.

use clap::Args;
use vmc::Context;

/// Open a shell in a running VM, or run a command in it.
#[derive(Args, Debug)]
pub struct SshCmd {
    /// VM name.
    pub name: String,

    /// Command to run; an interactive shell when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl SshCmd {
    /// Execute the ssh command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let manager = ctx.manager()?;
        manager.require(&self.name)?;

        let state = manager.state(&self.name)?;
        if !state.is_running() {
            return Err(vmc::Error::invalid_state(&self.name, "running", state.name()));
        }
        let ip = manager.stored_ip(&self.name)?.ok_or_else(|| {
            vmc::Error::network(format!("vm '{}' has no valid ip assigned", self.name))
        })?;

        let shell = manager.shell();
        if self.command.is_empty() {
            shell.interactive(&ip)
        } else {
            shell.run(&ip, &self.command.join(" "), true)
        }
    }
}
