//! vmc CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vmc::config::VmcConfig;
use vmc::Context;

mod cli;

/// vmc - simple local VM manager on top of VirtualBox
#[derive(Parser, Debug)]
#[command(name = "vmc")]
#[command(about = "Simple local VM manager on top of VirtualBox")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all VMs.
    #[command(alias = "ls")]
    List(cli::list::ListCmd),

    /// Create a VM from an image.
    Create(cli::create::CreateCmd),

    /// Delete a VM and its disks.
    #[command(aliases = ["del", "rm"])]
    Delete(cli::delete::DeleteCmd),

    /// Start a VM.
    Start(cli::start::StartCmd),

    /// Stop a running VM.
    Stop(cli::stop::StopCmd),

    /// Open a shell in a VM or run a command in it.
    Ssh(cli::ssh::SshCmd),

    /// Provision VMs from a file (default: vm.conf).
    #[command(alias = "provision")]
    Prov(cli::prov::ProvCmd),

    /// Show a VM's settings.
    Info(cli::info::InfoCmd),

    /// Change a VM's CPU count and memory.
    #[command(alias = "modify")]
    Mod(cli::modify::ModifyCmd),

    /// Assign an IP address to a VM.
    Ip(cli::ip::IpCmd),

    /// Manage images.
    #[command(subcommand)]
    Image(cli::image::ImageCmd),

    /// Manage host networks.
    #[command(subcommand)]
    Net(cli::net::NetCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    tracing::debug!(version = vmc::VERSION, "starting vmc");

    let config = load_config();

    let result = Context::new(config).and_then(|ctx| match cli.command {
        Commands::List(cmd) => cmd.run(&ctx),
        Commands::Create(cmd) => cmd.run(&ctx),
        Commands::Delete(cmd) => cmd.run(&ctx),
        Commands::Start(cmd) => cmd.run(&ctx),
        Commands::Stop(cmd) => cmd.run(&ctx),
        Commands::Ssh(cmd) => cmd.run(&ctx),
        Commands::Prov(cmd) => cmd.run(&ctx),
        Commands::Info(cmd) => cmd.run(&ctx),
        Commands::Mod(cmd) => cmd.run(&ctx),
        Commands::Ip(cmd) => cmd.run(&ctx),
        Commands::Image(cmd) => cmd.run(&ctx),
        Commands::Net(cmd) => cmd.run(&ctx),
    });

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load settings; the first run writes the defaults.
fn load_config() -> VmcConfig {
    VmcConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        VmcConfig::default()
    })
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vmc=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
