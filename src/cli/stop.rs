//! Stop command implementation.

use super::parsers::parse_duration;
use clap::Args;
use std::time::Duration;
use vmc::vm::ShutdownPolicy;
use vmc::Context;

/// Stop a running VM.
#[derive(Args, Debug)]
pub struct StopCmd {
    /// VM name to stop.
    pub name: String,

    /// Stop without confirmation.
    #[arg(short, long)]
    pub force: bool,

    /// Skip the in-guest shutdown and power off immediately.
    #[arg(long)]
    pub hard: bool,

    /// How long each shutdown phase may take (e.g. "3s", "10s").
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

impl StopCmd {
    /// Execute the stop command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        if let Some(timeout) = self.timeout {
            manager = manager.with_shutdown_policy(ShutdownPolicy::with_timeout(timeout));
        }

        if !manager.is_running(&self.name)? {
            println!("VM '{}' is not running", self.name);
            return Ok(());
        }

        if !self.force && !super::confirm(&format!("Stop VM '{}'?", self.name)) {
            println!("Cancelled");
            return Ok(());
        }

        println!("Stopping VM '{}'...", self.name);
        manager.stop_machine(&self.name, !self.hard)?;
        println!("Stopped VM '{}'", self.name);
        Ok(())
    }
}
