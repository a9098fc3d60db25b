// ============================================================================
// File: os-faults/src/bin/os-faults.rs
// ----------------------------------------------------------------------------
// Operational tool: verify connectivity, snapshot discovery, list nodes and
// registered drivers.
// ============================================================================

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use os_faults::config::resolve_config_path;
use os_faults::{CloudConfig, Registry};

#[derive(Parser)]
#[command(name = "os-faults")]
#[command(version, about = "Fault injection for cloud deployments")]
struct Cli {
    /// Enable debug logs
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify connection to the cloud
    Verify {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Discover nodes and write a config with a static node list
    Discover {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the resulting configuration
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Print the cloud nodes as YAML
    Nodes {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List registered drivers
    Drivers,
}

fn load_config(path: Option<PathBuf>) -> Result<CloudConfig> {
    let path = resolve_config_path(path.as_deref())?;
    info!("Using configuration {}", path.display());
    CloudConfig::from_file(&path).with_context(|| format!("Failed to load {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Verify { config } => {
            let cloud = os_faults::connect(&load_config(config)?)?;
            cloud.verify().await?;
        }
        Commands::Discover { config, output } => {
            let discovered = os_faults::discover(&load_config(config)?).await?;
            let yaml = discovered.to_yaml()?;
            fs::write(&output, &yaml)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Saved configuration with discovered nodes to {}", output.display());
            print!("{yaml}");
        }
        Commands::Nodes { config } => {
            let cloud = os_faults::connect(&load_config(config)?)?;
            let nodes = cloud.get_nodes(None).await?;
            print!("{}", serde_yaml::to_string(&nodes.hosts())?);
        }
        Commands::Drivers => {
            let registry = Registry::global()?;
            for (name, spec) in registry.get_drivers() {
                println!("{name}: {} [{}]", spec.description, spec.capabilities().join(", "));
            }
        }
    }

    Ok(())
}
