//! Start command implementation.

use clap::Args;
use vmc::vm::Frontend;
use vmc::Context;

/// Start a stopped VM.
#[derive(Args, Debug)]
pub struct StartCmd {
    /// VM name to start.
    pub name: String,

    /// Open a window instead of running headless.
    #[arg(long)]
    pub gui: bool,
}

impl StartCmd {
    /// Execute the start command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let mut manager = ctx.manager()?;
        let frontend = if self.gui {
            Frontend::Gui
        } else {
            Frontend::Headless
        };

        manager.start_machine(&self.name, frontend)?;
        println!("Started VM '{}'", self.name);
        Ok(())
    }
}
