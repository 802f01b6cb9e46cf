//! Partitioning algorithms and capability-based selection.
//!
//! Algorithms are not discovered by type. Each one is described by an
//! [`AlgorithmDescriptor`]: a name, a kind tag, the label kinds it accepts
//! on the model and hardware graphs, and a constructor. Selection is plain
//! filtering over the descriptor table held by a [`PartitionerRegistry`].
//!
//! # Example
//!
//! ```
//! use simdist_config::PartitioningConfig;
//! use simdist_core::{LabeledGraph, PartitionerRegistry};
//!
//! let mut model = LabeledGraph::default();
//! model.add_vertex("a", 1.0, None).unwrap();
//! model.add_vertex("b", 1.0, None).unwrap();
//! model.add_edge("a", "b", 1.0, None).unwrap();
//!
//! let mut hardware = LabeledGraph::default();
//! hardware.add_vertex("h1", 1.0, None).unwrap();
//!
//! let registry = PartitionerRegistry::builtin();
//! let partition = registry
//!     .partition(&PartitioningConfig::default(), "demo", &model, &hardware)
//!     .unwrap();
//! assert_eq!(partition.host_of("a"), Some("h1"));
//! ```

mod balance;
mod exhaustive;
mod greedy;
mod linear;
mod multilevel;

pub use exhaustive::ExhaustivePartitioner;
pub use greedy::GreedyGrowingPartitioner;
pub use linear::LinearPartitioner;
pub use multilevel::MultilevelPartitioner;

use crate::error::PartitioningError;
use crate::graph::{LabelKind, LabeledGraph};
use crate::partition::Partition;
use serde::{Deserialize, Serialize};
use simdist_config::{PartitionerType, PartitioningConfig};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// Algorithm trait
// ============================================================================

/// A strategy that assigns model vertices to hosts.
pub trait PartitioningAlgorithm: Send + Sync {
    /// Registered name.
    fn name(&self) -> &'static str;

    /// Compute a partition of `model` onto the vertices of `hardware`.
    ///
    /// `model_name` is only used for logging and error messages.
    fn run(
        &self,
        model_name: &str,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<Partition, PartitioningError>;
}

/// Compile-time check that the trait stays object safe.
fn _assert_object_safe(_: &dyn PartitioningAlgorithm) {}

// ============================================================================
// Capabilities
// ============================================================================

/// Structural kind of an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionerKind {
    /// Partitions the input graph directly
    SingleLevel,
    /// Coarsens, partitions the coarsest graph, then projects back
    MultiLevel,
}

impl PartitionerKind {
    /// Whether this kind satisfies a requested partitioner type.
    pub fn matches(self, requested: PartitionerType) -> bool {
        match requested {
            PartitionerType::AnyType => true,
            PartitionerType::SingleLevelOnly => self == PartitionerKind::SingleLevel,
            PartitionerType::MultiLevelOnly => self == PartitionerKind::MultiLevel,
        }
    }
}

impl fmt::Display for PartitionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionerKind::SingleLevel => f.write_str("single-level"),
            PartitionerKind::MultiLevel => f.write_str("multi-level"),
        }
    }
}

/// Which label kinds an algorithm can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelSupport {
    /// Labels are ignored, any kind is fine
    Any,
    /// Labels are merged, so text and numeric may not be mixed
    Homogeneous,
    /// Only unlabeled elements
    Unlabeled,
}

impl LabelSupport {
    pub fn supports(self, kind: LabelKind) -> bool {
        match self {
            LabelSupport::Any => true,
            LabelSupport::Homogeneous => kind != LabelKind::Mixed,
            LabelSupport::Unlabeled => kind == LabelKind::None,
        }
    }
}

/// Constructor stored in a descriptor.
pub type AlgorithmConstructor = fn(&PartitioningConfig) -> Box<dyn PartitioningAlgorithm>;

/// Static description of a registered algorithm.
#[derive(Clone)]
pub struct AlgorithmDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: PartitionerKind,
    pub model_labels: LabelSupport,
    pub hardware_labels: LabelSupport,
    /// Higher wins when no algorithm is named
    pub priority: u8,
    pub constructor: AlgorithmConstructor,
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model_labels", &self.model_labels)
            .field("hardware_labels", &self.hardware_labels)
            .field("priority", &self.priority)
            .finish()
    }
}

impl AlgorithmDescriptor {
    /// Whether the model graph's edge and vertex label kinds are accepted.
    pub fn supports_model_graph_labels(&self, edge: LabelKind, vertex: LabelKind) -> bool {
        self.model_labels.supports(edge) && self.model_labels.supports(vertex)
    }

    /// Whether the hardware graph's edge and vertex label kinds are accepted.
    pub fn supports_hardware_graph_labels(&self, edge: LabelKind, vertex: LabelKind) -> bool {
        self.hardware_labels.supports(edge) && self.hardware_labels.supports(vertex)
    }

    /// Reason this descriptor cannot serve a request, if any.
    pub fn ineligibility(
        &self,
        kind: PartitionerType,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Option<String> {
        if !self.kind.matches(kind) {
            return Some(format!("{} algorithm does not satisfy '{}'", self.kind, kind));
        }
        if !self.supports_model_graph_labels(model.edge_label_kind(), model.vertex_label_kind()) {
            return Some(format!(
                "model graph labels (edges: {}, vertices: {}) are not supported",
                model.edge_label_kind(),
                model.vertex_label_kind()
            ));
        }
        if !self.supports_hardware_graph_labels(
            hardware.edge_label_kind(),
            hardware.vertex_label_kind(),
        ) {
            return Some(format!(
                "hardware graph labels (edges: {}, vertices: {}) are not supported",
                hardware.edge_label_kind(),
                hardware.vertex_label_kind()
            ));
        }
        None
    }

    /// Instantiate the algorithm.
    pub fn build(&self, config: &PartitioningConfig) -> Box<dyn PartitioningAlgorithm> {
        (self.constructor)(config)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Table of available partitioning algorithms.
#[derive(Debug, Clone, Default)]
pub struct PartitionerRegistry {
    descriptors: Vec<AlgorithmDescriptor>,
}

impl PartitionerRegistry {
    /// Registry without any algorithm.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in algorithms.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(LinearPartitioner::descriptor());
        registry.register(GreedyGrowingPartitioner::descriptor());
        registry.register(ExhaustivePartitioner::descriptor());
        registry.register(MultilevelPartitioner::descriptor());
        registry
    }

    /// Register a descriptor, replacing any existing one with the same name.
    pub fn register(&mut self, descriptor: AlgorithmDescriptor) {
        if let Some(slot) = self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            debug!("Replacing partitioning algorithm '{}'", descriptor.name);
            *slot = descriptor;
        } else {
            self.descriptors.push(descriptor);
        }
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> &[AlgorithmDescriptor] {
        &self.descriptors
    }

    /// Descriptor by name.
    pub fn get(&self, name: &str) -> Option<&AlgorithmDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Descriptors eligible for the requested kind and the graphs' labels,
    /// in registration order.
    pub fn filter(
        &self,
        kind: PartitionerType,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Vec<&AlgorithmDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.ineligibility(kind, model, hardware).is_none())
            .collect()
    }

    /// Pick the algorithm for a request.
    ///
    /// A configured name must exist and be eligible. Without a name the
    /// eligible descriptor with the highest priority wins, earliest
    /// registration breaking ties.
    pub fn select(
        &self,
        config: &PartitioningConfig,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<&AlgorithmDescriptor, PartitioningError> {
        if let Some(ref name) = config.algorithm {
            let descriptor = self
                .get(name)
                .ok_or_else(|| PartitioningError::UnknownAlgorithm(name.clone()))?;
            if let Some(reason) = descriptor.ineligibility(config.kind, model, hardware) {
                return Err(PartitioningError::ineligible(name.clone(), reason));
            }
            return Ok(descriptor);
        }

        self.filter(config.kind, model, hardware)
            .into_iter()
            .rev()
            .max_by_key(|d| d.priority)
            .ok_or(PartitioningError::NoEligibleAlgorithm { kind: config.kind })
    }

    /// Select, run and verify a partition.
    ///
    /// The result is checked for totality and balance before it is returned.
    pub fn partition(
        &self,
        config: &PartitioningConfig,
        model_name: &str,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<Partition, PartitioningError> {
        if hardware.is_empty() {
            return Err(PartitioningError::NoHosts);
        }
        let descriptor = self.select(config, model, hardware)?;
        info!(
            algorithm = descriptor.name,
            model = model_name,
            "Partitioning {} vertices onto {} hosts",
            model.vertex_count(),
            hardware.vertex_count()
        );

        let algorithm = descriptor.build(config);
        let partition = algorithm.run(model_name, model, hardware)?;

        partition.validate_total(model, hardware)?;
        partition.check_balance(model, hardware, config.balance_tolerance)?;

        info!(
            algorithm = descriptor.name,
            model = model_name,
            "Partition ready: cut weight {:.3}, {} hosts used",
            partition.cut_weight(model),
            partition.hosts_used().len()
        );
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Label;
    use pretty_assertions::assert_eq;

    fn graphs() -> (LabeledGraph, LabeledGraph) {
        let mut model = LabeledGraph::default();
        for v in ["a", "b", "c", "d"] {
            model.add_vertex(v, 1.0, None).unwrap();
        }
        model.add_edge("a", "b", 2.0, None).unwrap();
        model.add_edge("b", "c", 1.0, None).unwrap();
        model.add_edge("c", "d", 2.0, None).unwrap();

        let mut hw = LabeledGraph::default();
        hw.add_vertex("h1", 1.0, None).unwrap();
        hw.add_vertex("h2", 1.0, None).unwrap();
        hw.add_edge("h1", "h2", 1.0, None).unwrap();
        (model, hw)
    }

    fn names(ds: &[&AlgorithmDescriptor]) -> Vec<&'static str> {
        ds.iter().map(|d| d.name).collect()
    }

    #[test]
    fn test_kind_matching() {
        assert!(PartitionerKind::SingleLevel.matches(PartitionerType::AnyType));
        assert!(PartitionerKind::SingleLevel.matches(PartitionerType::SingleLevelOnly));
        assert!(!PartitionerKind::SingleLevel.matches(PartitionerType::MultiLevelOnly));
        assert!(PartitionerKind::MultiLevel.matches(PartitionerType::MultiLevelOnly));
    }

    #[test]
    fn test_label_support() {
        assert!(LabelSupport::Any.supports(LabelKind::Mixed));
        assert!(LabelSupport::Homogeneous.supports(LabelKind::Text));
        assert!(!LabelSupport::Homogeneous.supports(LabelKind::Mixed));
        assert!(LabelSupport::Unlabeled.supports(LabelKind::None));
        assert!(!LabelSupport::Unlabeled.supports(LabelKind::Numeric));
    }

    #[test]
    fn test_filter_by_kind() {
        let (model, hw) = graphs();
        let registry = PartitionerRegistry::builtin();

        assert_eq!(
            names(&registry.filter(PartitionerType::AnyType, &model, &hw)),
            vec!["linear", "greedy-growing", "exhaustive", "multilevel"]
        );
        assert_eq!(
            names(&registry.filter(PartitionerType::SingleLevelOnly, &model, &hw)),
            vec!["linear", "greedy-growing", "exhaustive"]
        );
        assert_eq!(
            names(&registry.filter(PartitionerType::MultiLevelOnly, &model, &hw)),
            vec!["multilevel"]
        );
    }

    #[test]
    fn test_filter_by_labels() {
        let (mut model, hw) = graphs();
        model.add_vertex("e", 1.0, Some(Label::Text("x".into()))).unwrap();
        model.add_vertex("f", 1.0, Some(Label::Numeric(1.0))).unwrap();

        let registry = PartitionerRegistry::builtin();
        assert!(registry
            .filter(PartitionerType::MultiLevelOnly, &model, &hw)
            .is_empty());

        let config = PartitioningConfig {
            kind: PartitionerType::MultiLevelOnly,
            ..Default::default()
        };
        assert!(matches!(
            registry.select(&config, &model, &hw),
            Err(PartitioningError::NoEligibleAlgorithm {
                kind: PartitionerType::MultiLevelOnly
            })
        ));
    }

    #[test]
    fn test_select_defaults_by_priority() {
        let (model, hw) = graphs();
        let registry = PartitionerRegistry::builtin();

        let config = PartitioningConfig::default();
        assert_eq!(registry.select(&config, &model, &hw).unwrap().name, "multilevel");

        let config = PartitioningConfig {
            kind: PartitionerType::SingleLevelOnly,
            ..Default::default()
        };
        assert_eq!(
            registry.select(&config, &model, &hw).unwrap().name,
            "greedy-growing"
        );
    }

    #[test]
    fn test_select_by_name() {
        let (model, hw) = graphs();
        let registry = PartitionerRegistry::builtin();

        let config = PartitioningConfig {
            algorithm: Some("linear".into()),
            ..Default::default()
        };
        assert_eq!(registry.select(&config, &model, &hw).unwrap().name, "linear");

        let config = PartitioningConfig {
            algorithm: Some("metis".into()),
            ..Default::default()
        };
        assert!(matches!(
            registry.select(&config, &model, &hw),
            Err(PartitioningError::UnknownAlgorithm(_))
        ));

        let config = PartitioningConfig {
            algorithm: Some("linear".into()),
            kind: PartitionerType::MultiLevelOnly,
            ..Default::default()
        };
        assert!(matches!(
            registry.select(&config, &model, &hw),
            Err(PartitioningError::Ineligible { .. })
        ));
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = PartitionerRegistry::builtin();
        let mut custom = LinearPartitioner::descriptor();
        custom.priority = 200;
        registry.register(custom);

        assert_eq!(registry.descriptors().len(), 4);
        let (model, hw) = graphs();
        assert_eq!(
            registry
                .select(&PartitioningConfig::default(), &model, &hw)
                .unwrap()
                .name,
            "linear"
        );
    }

    #[test]
    fn test_partition_rejects_empty_hardware() {
        let (model, _) = graphs();
        let registry = PartitionerRegistry::builtin();
        let err = registry
            .partition(
                &PartitioningConfig::default(),
                "m",
                &model,
                &LabeledGraph::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PartitioningError::NoHosts));
    }

    #[test]
    fn test_partition_verifies_result() {
        let (model, hw) = graphs();
        let registry = PartitionerRegistry::builtin();
        for d in registry.descriptors() {
            let config = PartitioningConfig {
                algorithm: Some(d.name.to_string()),
                ..Default::default()
            };
            let p = registry.partition(&config, "path", &model, &hw).unwrap();
            assert_eq!(p.len(), 4, "{}", d.name);
        }
    }

    #[test]
    fn test_empty_registry() {
        let (model, hw) = graphs();
        let registry = PartitionerRegistry::empty();
        assert!(registry
            .select(&PartitioningConfig::default(), &model, &hw)
            .is_err());
    }
}
