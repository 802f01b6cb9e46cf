//! Errors raised while reading, layering and checking simdist configuration.

use std::net::AddrParseError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config layer exists but could not be read
    #[error("cannot read config layer {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config layer is not TOML, or its keys do not fit the schema
    #[error("malformed config layer {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Layers that each parse on their own do not combine
    #[error("config layers do not combine: {0}")]
    Layering(#[source] toml::de::Error),

    #[error("cannot render configuration as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// Writing a config file, or creating its directory, failed
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The global `~/.simdist` layer needs a home directory
    #[error("no home directory for the global ~/.simdist layer")]
    NoHomeDir,

    #[error(
        "unknown partitioner type '{0}' (expected single-level-only, multi-level-only or any-type)"
    )]
    UnknownPartitionerType(String),

    /// A partitioning or migration setting outside its range
    #[error("{key} {requirement}")]
    OutOfRange {
        key: &'static str,
        requirement: &'static str,
    },

    /// A `[transport.peers]` entry that is not a socket address
    #[error("transport.peers.{host}: '{address}' is not a socket address: {source}")]
    PeerAddress {
        host: String,
        address: String,
        #[source]
        source: AddrParseError,
    },
}

impl ConfigError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn out_of_range(key: &'static str, requirement: &'static str) -> Self {
        Self::OutOfRange { key, requirement }
    }

    /// Key path of the offending setting, when the error is about one.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::OutOfRange { key, .. } => Some(key.to_string()),
            Self::PeerAddress { host, .. } => Some(format!("transport.peers.{}", host)),
            Self::UnknownPartitionerType(_) => Some("partitioning.kind".to_string()),
            _ => None,
        }
    }
}
