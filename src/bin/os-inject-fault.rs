// ============================================================================
// File: os-faults/src/bin/os-inject-fault.rs
// ----------------------------------------------------------------------------
// Run one human API command, e.g.
//   os-inject-fault restart keystone service on one node
// ============================================================================

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

#[derive(Parser)]
#[command(name = "os-inject-fault")]
#[command(version, about = "Inject a fault described in plain words")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verify connection to the cloud first
    #[arg(short, long)]
    verify: bool,

    /// Enable debug logs
    #[arg(short, long)]
    debug: bool,

    /// Command words, e.g. `kill mysql service on one node`
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if cli.command.is_empty() && !cli.verify {
        bail!("Nothing to do: pass a command or --verify");
    }

    let cloud = os_faults::connect_from_file(cli.config.as_deref())?;
    if cli.verify {
        cloud.verify().await?;
    }
    if !cli.command.is_empty() {
        os_faults::human_api(&cloud, &cli.command.join(" ")).await?;
    }

    Ok(())
}
