//! simdist CLI - Partition simulation models and host migratable objects
//!
//! A command-line interface for mapping model graphs onto hardware graphs,
//! inspecting the available partitioning algorithms and running a host
//! that serves the object migration protocol over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Partition a model onto a hardware description
//! simdist partition --model model.json --hardware hosts.json
//!
//! # Show which algorithms are eligible for a pair of graphs
//! simdist algorithms --model model.json --hardware hosts.json
//!
//! # Run a host and join a cluster
//! simdist serve --host H1 --bind 127.0.0.1:7401 --peer H2=127.0.0.1:7402
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use simdist_config::{LogFormat, LoggingConfig, PartitionerType};
use tracing_subscriber::EnvFilter;

mod commands;

/// simdist - Graph partitioning and live object migration for distributed simulation
#[derive(Parser, Debug)]
#[command(name = "simdist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "SIMDIST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,
}

impl GlobalOptions {
    /// Log level forced by the verbosity flags, if any.
    fn forced_log_level(&self) -> Option<&'static str> {
        if self.quiet {
            Some("error")
        } else if self.verbose {
            Some("debug")
        } else {
            None
        }
    }
}

/// Parse a partitioner kind from its kebab-case name
fn parse_partitioner_type(s: &str) -> Result<PartitionerType, String> {
    s.parse()
        .map_err(|e: simdist_config::ConfigError| e.to_string())
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Partition a model graph onto a hardware graph
    Partition(commands::partition::PartitionArgs),

    /// List partitioning algorithms and their eligibility
    Algorithms(commands::algorithms::AlgorithmsArgs),

    /// Show the coarsening hierarchy of a model graph
    Coarsen(commands::coarsen::CoarsenArgs),

    /// Run a host serving the migration protocol over TCP
    Serve(commands::serve::ServeArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn init_tracing(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let level = global
        .forced_log_level()
        .map(str::to_string)
        .unwrap_or_else(|| logging.level.clone());
    let filter = if global.forced_log_level().is_some() {
        EnvFilter::new(&level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (&logging.file, &logging.format) {
        (Some(path), LogFormat::Json) => {
            let file = open_log_file(path)?;
            builder.json().with_writer(Mutex::new(file)).try_init()
        }
        (Some(path), LogFormat::Text) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        (None, LogFormat::Json) => builder.json().with_writer(std::io::stderr).try_init(),
        (None, LogFormat::Text) => builder
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn open_log_file(path: &std::path::Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config; a broken config is reported by
    // the command itself, so fall back to defaults here.
    let logging = commands::load_config(&cli.global, None)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_tracing(&cli.global, &logging)?;

    match cli.command {
        Commands::Partition(args) => commands::partition::execute(args, cli.global).await,
        Commands::Algorithms(args) => commands::algorithms::execute(args, cli.global).await,
        Commands::Coarsen(args) => commands::coarsen::execute(args, cli.global).await,
        Commands::Serve(args) => commands::serve::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
