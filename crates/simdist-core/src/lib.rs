//! simdist Core - Model graph partitioning for distributed simulation
//!
//! This crate computes the initial placement of simulation components:
//! - Labeled graph model for model-interaction and hardware-topology graphs
//! - Level-by-level coarsening with recorded child → parent maps
//! - Single-level and multi-level partitioning algorithms
//! - Capability-based algorithm selection through a descriptor registry
//! - Partition metrics: cut weight, communication cost, balance

pub mod coarsening;
pub mod error;
pub mod graph;
pub mod partition;
pub mod partitioning;

pub use coarsening::{
    AbortCriterion, AllOf, CoarseningEngine, HeavyEdgeMatching, MaxLevelsCriterion, MergeRule,
    RatioCriterion, VertexCountCriterion,
};
pub use error::{GraphError, PartitioningError};
pub use graph::{
    EdgeData, EdgeDescription, GraphDescription, Label, LabelKind, LabeledGraph, Vertex,
    VertexDescription, VertexSpec,
};
pub use partition::{balance_bounds, capacity_shares, Partition, PartitionStats};
pub use partitioning::{
    AlgorithmConstructor, AlgorithmDescriptor, ExhaustivePartitioner, GreedyGrowingPartitioner,
    LabelSupport, LinearPartitioner, MultilevelPartitioner, PartitionerKind, PartitionerRegistry,
    PartitioningAlgorithm,
};

/// Result type for partitioning operations.
pub type Result<T> = std::result::Result<T, PartitioningError>;
