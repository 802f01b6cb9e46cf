//! CLI command implementations

pub mod algorithms;
pub mod coarsen;
pub mod config;
pub mod partition;
pub mod serve;

use std::path::Path;

use anyhow::{Context, Result};
use simdist_config::{ConfigLoader, ConfigOverrides, SimdistConfig};
use simdist_core::LabeledGraph;

use crate::GlobalOptions;

/// Load configuration with optional config file override.
///
/// An explicit `--config` file replaces the global/local merge.
pub fn load_config(
    global: &GlobalOptions,
    overrides: Option<&ConfigOverrides>,
) -> Result<SimdistConfig> {
    let mut loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        return loader
            .load_file(config_path, overrides)
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    let root = std::env::current_dir().context("Failed to get current directory")?;
    loader
        .load(&root, overrides)
        .context("Failed to load configuration")
}

/// Read a JSON graph description.
pub fn load_graph(path: &Path, what: &str) -> Result<LabeledGraph> {
    LabeledGraph::load_json(path)
        .with_context(|| format!("Failed to load {} graph from {}", what, path.display()))
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Model name used in logs: the file stem of its description.
pub fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}
