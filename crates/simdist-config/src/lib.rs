//! simdist Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.simdist/config.toml`
//! - Local config: `.simdist/config.toml` (in the experiment directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! File layers merge as TOML tables in order global → local, then CLI
//! overrides apply; see [`ConfigLoader`].
//!
//! The surrounding simulation framework hands these records to the core as
//! opaque policy: which partitioner to run and how migrations behave.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ConfigScope};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for simdist.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SimdistConfig {
    /// Partitioner selection and quality settings
    pub partitioning: PartitioningConfig,

    /// Runtime migration policy
    pub migration: MigrationConfig,

    /// Host transport settings
    pub transport: TransportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Partitioning
// ============================================================================

/// Requested partitioner family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionerType {
    /// Only direct, single-level algorithms
    SingleLevelOnly,
    /// Only coarsen/partition/refine algorithms
    MultiLevelOnly,
    /// Any registered algorithm (default)
    #[default]
    AnyType,
}

impl std::fmt::Display for PartitionerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleLevelOnly => write!(f, "single-level-only"),
            Self::MultiLevelOnly => write!(f, "multi-level-only"),
            Self::AnyType => write!(f, "any-type"),
        }
    }
}

impl std::str::FromStr for PartitionerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "single-level-only" | "single-level" | "single" => Ok(Self::SingleLevelOnly),
            "multi-level-only" | "multi-level" | "multi" => Ok(Self::MultiLevelOnly),
            "any-type" | "any" => Ok(Self::AnyType),
            _ => Err(ConfigError::UnknownPartitionerType(s.to_string())),
        }
    }
}

/// Partitioning configuration.
///
/// # Example TOML
///
/// ```toml
/// [partitioning]
/// algorithm = "multilevel"
/// kind = "any-type"
/// balance_tolerance = 0.05
///
/// [partitioning.coarsening]
/// vertices_per_host = 2
/// max_levels = 32
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PartitioningConfig {
    /// Algorithm name; `None` picks the best eligible one
    pub algorithm: Option<String>,

    /// Requested partitioner family
    pub kind: PartitionerType,

    /// Allowed relative overload of a host's capacity share
    pub balance_tolerance: f64,

    /// Maximum boundary refinement passes per level
    pub refinement_passes: usize,

    /// Largest model graph the exhaustive partitioner accepts
    pub exhaustive_max_vertices: usize,

    /// Coarsening settings for multi-level algorithms
    pub coarsening: CoarseningConfig,
}

impl Default for PartitioningConfig {
    fn default() -> Self {
        Self {
            algorithm: None,
            kind: PartitionerType::default(),
            balance_tolerance: 0.05,
            refinement_passes: 8,
            exhaustive_max_vertices: 12,
            coarsening: CoarseningConfig::default(),
        }
    }
}

/// Coarsening configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoarseningConfig {
    /// Stop coarsening once the graph has at most `hosts * vertices_per_host` vertices
    pub vertices_per_host: usize,

    /// Hard cap on the number of coarsening levels
    pub max_levels: usize,

    /// Stop when a level keeps more than this fraction of the previous vertices
    pub min_reduction_ratio: f64,
}

impl Default for CoarseningConfig {
    fn default() -> Self {
        Self {
            vertices_per_host: 2,
            max_levels: 32,
            min_reduction_ratio: 0.95,
        }
    }
}

// ============================================================================
// Migration
// ============================================================================

/// Migration protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationConfig {
    /// Timeout for every cross-host call in milliseconds
    pub rpc_timeout_ms: u64,

    /// Attempts per peer notification during commit
    pub notify_attempts: u32,

    /// Initial backoff between notification attempts (doubled each retry)
    pub notify_backoff_ms: u64,

    /// Stale-owner redirects a proxy follows before giving up
    pub max_redirects: u32,

    /// Whether this host accepts incoming migrations
    pub accept_migrations: bool,

    /// Upper bound on locally hosted objects (None = unbounded)
    pub max_hosted_objects: Option<usize>,

    /// How long a caller stays a communication partner
    pub partner_window_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 2000,
            notify_attempts: 3,
            notify_backoff_ms: 50,
            max_redirects: 4,
            accept_migrations: true,
            max_hosted_objects: None,
            partner_window_secs: 300,
        }
    }
}

impl MigrationConfig {
    /// RPC timeout as a `Duration`.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Backoff before the given retry (1-based), doubling each time.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.notify_backoff_ms.saturating_mul(factor))
    }

    /// Communication partner window as a `Duration`.
    pub fn partner_window(&self) -> Duration {
        Duration::from_secs(self.partner_window_secs)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Host transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Address this host listens on
    pub bind: String,

    /// Peer hosts (host id → socket address)
    pub peers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7411".to_string(),
            peers: HashMap::new(),
        }
    }
}

impl TransportConfig {
    /// Parse the peer table into socket addresses.
    pub fn peer_addrs(&self) -> Result<HashMap<String, SocketAddr>, ConfigError> {
        self.peers
            .iter()
            .map(|(host, addr)| {
                addr.parse::<SocketAddr>()
                    .map(|a| (host.clone(), a))
                    .map_err(|source| ConfigError::PeerAddress {
                        host: host.clone(),
                        address: addr.clone(),
                        source,
                    })
            })
            .collect()
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

// ============================================================================
// Overrides
// ============================================================================

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override partitioning algorithm
    pub algorithm: Option<String>,

    /// Override partitioner type
    pub kind: Option<PartitionerType>,

    /// Override balance tolerance
    pub balance_tolerance: Option<f64>,

    /// Override RPC timeout
    pub rpc_timeout_ms: Option<u64>,

    /// Override bind address
    pub bind: Option<String>,

    /// Override log level
    pub log_level: Option<String>,
}

impl SimdistConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref algorithm) = overrides.algorithm {
            self.partitioning.algorithm = Some(algorithm.clone());
        }

        if let Some(kind) = overrides.kind {
            self.partitioning.kind = kind;
        }

        if let Some(tolerance) = overrides.balance_tolerance {
            self.partitioning.balance_tolerance = tolerance;
        }

        if let Some(timeout) = overrides.rpc_timeout_ms {
            self.migration.rpc_timeout_ms = timeout;
        }

        if let Some(ref bind) = overrides.bind {
            self.transport.bind = bind.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.partitioning;
        if !p.balance_tolerance.is_finite() || p.balance_tolerance < 0.0 {
            return Err(ConfigError::out_of_range(
                "partitioning.balance_tolerance",
                "must be a finite, non-negative number",
            ));
        }
        if p.coarsening.vertices_per_host == 0 {
            return Err(ConfigError::out_of_range(
                "partitioning.coarsening.vertices_per_host",
                "must be at least 1",
            ));
        }
        if p.coarsening.max_levels == 0 {
            return Err(ConfigError::out_of_range(
                "partitioning.coarsening.max_levels",
                "must be at least 1",
            ));
        }
        let ratio = p.coarsening.min_reduction_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::out_of_range(
                "partitioning.coarsening.min_reduction_ratio",
                "must be in (0, 1]",
            ));
        }

        let m = &self.migration;
        if m.rpc_timeout_ms == 0 {
            return Err(ConfigError::out_of_range(
                "migration.rpc_timeout_ms",
                "must be greater than zero",
            ));
        }
        if m.notify_attempts == 0 {
            return Err(ConfigError::out_of_range(
                "migration.notify_attempts",
                "must be at least 1",
            ));
        }

        self.transport.peer_addrs()?;
        Ok(())
    }
}
