//! Layered configuration loading.
//!
//! An experiment's effective configuration stacks, lowest layer first:
//! 1. built-in defaults
//! 2. the global layer, `~/.simdist/config.toml`
//! 3. the experiment layer, `.simdist/config.toml` in the experiment
//!    directory, or one explicit file passed with `--config`
//! 4. command-line overrides
//!
//! File layers are merged as TOML tables before the result is typed. A key
//! written in a file therefore wins over every layer below it, even when it
//! spells out the built-in default. Tables merge key by key, so
//! `[transport.peers]` entries from both files survive.

use crate::error::ConfigError;
use crate::{ConfigOverrides, SimdistConfig};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, trace};

const CONFIG_DIR: &str = ".simdist";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Written above the defaults by [`ConfigLoader::init`].
const INIT_HEADER: &str = "\
# simdist configuration
#
# Keys removed from this file fall back to the layer below it: the global
# ~/.simdist/config.toml for an experiment file, built-in defaults otherwise.

";

/// Which file layer an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope<'a> {
    /// `~/.simdist/config.toml`
    Global,
    /// `.simdist/config.toml` inside the given experiment directory
    Experiment(&'a Path),
}

/// Reads and stacks configuration layers. The global layer is read once and
/// kept until [`ConfigLoader::clear_cache`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_dir: Option<PathBuf>,
    global_layer: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader whose global layer lives under the user's home directory.
    pub fn new() -> Self {
        Self {
            global_dir: dirs::home_dir().map(|home| home.join(CONFIG_DIR)),
            global_layer: None,
        }
    }

    /// Loader with the global layer in `global_dir` instead of `~/.simdist`.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: Some(global_dir.into()),
            global_layer: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// File backing a scope.
    pub fn path(&self, scope: ConfigScope<'_>) -> Result<PathBuf, ConfigError> {
        match scope {
            ConfigScope::Global => self.global_config_path().ok_or(ConfigError::NoHomeDir),
            ConfigScope::Experiment(root) => Ok(self.local_config_path(root)),
        }
    }

    /// Effective configuration for the experiment in `root`: defaults, then
    /// the global layer, then the experiment layer, then `overrides`.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SimdistConfig, ConfigError> {
        let mut layers = self.global_layer()?.unwrap_or_default();

        let local_path = self.local_config_path(root);
        if let Some(local) = read_optional_layer(&local_path)? {
            debug!(path = %local_path.display(), "Applying experiment config layer");
            merge_layer(&mut layers, local);
        }

        finish(layers, overrides)
    }

    /// Effective configuration from one explicit file on top of the defaults.
    /// The global and experiment layers are skipped.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SimdistConfig, ConfigError> {
        debug!(path = %path.display(), "Loading explicit config file");
        finish(read_layer(path)?, overrides)
    }

    /// Global layer alone, typed over the defaults.
    pub fn load_global(&mut self) -> Result<Option<SimdistConfig>, ConfigError> {
        self.global_layer()?
            .map(|layer| type_layers(layer).map_err(ConfigError::Layering))
            .transpose()
    }

    /// Experiment layer alone, typed over the defaults.
    pub fn load_local(&self, root: &Path) -> Result<Option<SimdistConfig>, ConfigError> {
        read_optional_layer(&self.local_config_path(root))?
            .map(|layer| type_layers(layer).map_err(ConfigError::Layering))
            .transpose()
    }

    fn global_layer(&mut self) -> Result<Option<Table>, ConfigError> {
        if self.global_layer.is_none() {
            let Some(path) = self.global_config_path() else {
                debug!("No home directory, skipping global config layer");
                return Ok(None);
            };
            self.global_layer = read_optional_layer(&path)?;
            if self.global_layer.is_some() {
                debug!(path = %path.display(), "Read global config layer");
            }
        }
        Ok(self.global_layer.clone())
    }

    /// Write the full `config` to a scope's file, replacing what is there.
    pub fn save(&self, scope: ConfigScope<'_>, config: &SimdistConfig) -> Result<(), ConfigError> {
        let path = self.path(scope)?;
        write_config(&path, &toml::to_string_pretty(config)?)
    }

    /// Create a scope's file with the defaults unless it already exists.
    /// Returns the file's path either way.
    pub fn init(&self, scope: ConfigScope<'_>) -> Result<PathBuf, ConfigError> {
        let path = self.path(scope)?;
        if path.exists() {
            trace!(path = %path.display(), "Config file already present");
            return Ok(path);
        }
        let defaults = toml::to_string_pretty(&SimdistConfig::default())?;
        write_config(&path, &format!("{}{}", INIT_HEADER, defaults))?;
        Ok(path)
    }

    /// Forget the cached global layer so the next load reads it again.
    pub fn clear_cache(&mut self) {
        self.global_layer = None;
    }
}

/// Read a layer that must exist. Its keys are checked against the schema
/// here so a bad value is reported with the file it came from.
fn read_layer(path: &Path) -> Result<Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    let layer: Table = toml::from_str(&content).map_err(|e| ConfigError::malformed(path, e))?;
    type_layers(layer.clone()).map_err(|e| ConfigError::malformed(path, e))?;
    Ok(layer)
}

fn read_optional_layer(path: &Path) -> Result<Option<Table>, ConfigError> {
    if !path.exists() {
        trace!(path = %path.display(), "No config layer");
        return Ok(None);
    }
    read_layer(path).map(Some)
}

/// Lay `overlay` over `base`: tables merge recursively, anything else in
/// `overlay` replaces the value below it.
fn merge_layer(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(below)), Value::Table(above)) => merge_layer(below, above),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn type_layers(layers: Table) -> Result<SimdistConfig, toml::de::Error> {
    Value::Table(layers).try_into()
}

fn finish(
    layers: Table,
    overrides: Option<&ConfigOverrides>,
) -> Result<SimdistConfig, ConfigError> {
    let mut config = type_layers(layers).map_err(ConfigError::Layering)?;
    if let Some(overrides) = overrides {
        config.apply_overrides(overrides);
    }
    config.validate()?;
    Ok(config)
}

fn write_config(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::write(dir, e))?;
    }
    std::fs::write(path, content).map_err(|e| ConfigError::write(path, e))
}
