//! Error types for graph construction and partitioning.

use simdist_config::PartitionerType;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or loading a graph.
///
/// These are always reported before any algorithm runs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An edge references a vertex that does not exist
    #[error("edge {source_id} -> {target_id} references unknown vertex '{missing}'")]
    DanglingEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    /// A vertex or edge weight is negative, NaN or infinite
    #[error("invalid weight {weight} on {element}: weights must be finite and non-negative")]
    InvalidWeight { element: String, weight: f64 },

    /// A vertex id was added twice
    #[error("duplicate vertex '{0}'")]
    DuplicateVertex(String),

    /// Self loop in a simple graph
    #[error("self loop on '{0}' is not allowed in a simple graph")]
    SelfLoop(String),

    /// Parallel edge in a simple graph
    #[error("parallel edge {source_id} -> {target_id} is not allowed in a simple graph")]
    ParallelEdge { source_id: String, target_id: String },

    /// A graph mixes text and numeric labels where merging is required
    #[error("graph mixes text and numeric {0} labels; labels cannot be merged")]
    MixedLabels(&'static str),

    /// Failed to read a graph description file
    #[error("failed to read graph file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode a graph description
    #[error("invalid graph description: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// Create a DanglingEndpoint error.
    pub fn dangling(source_id: &str, target_id: &str, missing: &str) -> Self {
        Self::DanglingEndpoint {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            missing: missing.to_string(),
        }
    }

    /// Create an InvalidWeight error.
    pub fn invalid_weight(element: impl Into<String>, weight: f64) -> Self {
        Self::InvalidWeight {
            element: element.into(),
            weight,
        }
    }

    /// Create an Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while selecting or running a partitioner.
#[derive(Debug, Error)]
pub enum PartitioningError {
    /// No registered algorithm matches the requested kind and graph labels
    #[error("no partitioning algorithm supports kind '{kind}' for these graph labels")]
    NoEligibleAlgorithm { kind: PartitionerType },

    /// The configured algorithm name is not registered
    #[error("unknown partitioning algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The configured algorithm exists but cannot handle this request
    #[error("partitioning algorithm '{name}' is not eligible: {reason}")]
    Ineligible { name: String, reason: String },

    /// The hardware graph has no hosts
    #[error("hardware graph has no hosts")]
    NoHosts,

    /// All hosts have zero capacity
    #[error("hardware graph has zero total capacity")]
    ZeroCapacity,

    /// The input is too large for the chosen algorithm
    #[error("model '{model}' has {vertices} vertices; algorithm '{algorithm}' accepts at most {max}")]
    TooLarge {
        model: String,
        algorithm: &'static str,
        vertices: usize,
        max: usize,
    },

    /// A model vertex is missing from the partition or mapped to an unknown host
    #[error("partition is not total: {0}")]
    NotTotal(String),

    /// A host carries more than its allowed share
    #[error("host '{host}' is overloaded: load {load:.3} exceeds bound {bound:.3}")]
    Unbalanced { host: String, load: f64, bound: f64 },

    /// Malformed input graph
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl PartitioningError {
    /// Create an Ineligible error.
    pub fn ineligible(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Ineligible {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotTotal error.
    pub fn not_total(message: impl Into<String>) -> Self {
        Self::NotTotal(message.into())
    }
}
