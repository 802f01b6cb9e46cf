//! Config command - View and manage configuration
//!
//! - Show the effective configuration (defaults, global, local merged)
//! - Show configuration file paths
//! - Create a default configuration file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use simdist_config::{ConfigLoader, ConfigScope};

use super::{load_config, print_info};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Show configuration file paths
    Path(PathArgs),

    /// Create a configuration file with default values
    Init(InitArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON instead of TOML
    #[arg(long)]
    json: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create the global config (~/.simdist/config.toml) instead of the local one
    #[arg(long)]
    global: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Whether global config exists
    pub global_exists: bool,
    /// Whether local config exists
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Path(args) => execute_path(args),
        ConfigCommand::Init(args) => execute_init(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, None)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        print!("{}", rendered);
    }
    Ok(())
}

fn execute_path(args: PathArgs) -> Result<()> {
    let loader = ConfigLoader::new();
    let root = std::env::current_dir().context("Failed to get current directory")?;

    let global = loader.global_config_path();
    let local = loader.local_config_path(&root);
    let paths = ConfigPaths {
        global_exists: global.as_ref().is_some_and(|p| p.exists()),
        local_exists: local.exists(),
        global,
        local,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    let exists = |e: bool| if e { "" } else { " (not found)" };
    match paths.global {
        Some(ref p) => println!("global: {}{}", p.display(), exists(paths.global_exists)),
        None => println!("global: (no home directory)"),
    }
    println!("local:  {}{}", paths.local.display(), exists(paths.local_exists));
    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = ConfigLoader::new();
    let path = if args.global {
        loader
            .init(ConfigScope::Global)
            .context("Failed to create global configuration")?
    } else {
        let root = std::env::current_dir().context("Failed to get current directory")?;
        loader
            .init(ConfigScope::Experiment(&root))
            .context("Failed to create local configuration")?
    };

    print_info(&format!("Configuration file: {}", path.display()), global.quiet);
    println!("{}", path.display());
    Ok(())
}
