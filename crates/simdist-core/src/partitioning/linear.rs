//! Linear partitioner: fills hosts in order, ignoring edges.

use super::balance::{rebalance, Problem};
use super::{AlgorithmDescriptor, LabelSupport, PartitionerKind, PartitioningAlgorithm};
use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use crate::partition::Partition;
use simdist_config::PartitioningConfig;
use tracing::debug;

/// Baseline partitioner that walks the model vertices in insertion order and
/// moves to the next host once the current one reaches its share.
#[derive(Debug, Clone)]
pub struct LinearPartitioner {
    tolerance: f64,
}

impl LinearPartitioner {
    pub const NAME: &'static str = "linear";

    pub fn new(config: &PartitioningConfig) -> Self {
        Self {
            tolerance: config.balance_tolerance,
        }
    }

    pub fn descriptor() -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            name: Self::NAME,
            description: "fill hosts in vertex order up to their capacity share",
            kind: PartitionerKind::SingleLevel,
            model_labels: LabelSupport::Any,
            hardware_labels: LabelSupport::Any,
            priority: 0,
            constructor: |config| -> Box<dyn PartitioningAlgorithm> {
                Box::new(LinearPartitioner::new(config))
            },
        }
    }
}

impl PartitioningAlgorithm for LinearPartitioner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(
        &self,
        model_name: &str,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<Partition, PartitioningError> {
        let problem = Problem::new(model, hardware, self.tolerance)?;
        let hosts = problem.usable_hosts();
        let last = hosts.len().saturating_sub(1);

        let mut assignment = Vec::with_capacity(problem.vertex_count());
        let mut pos = 0;
        let mut load = 0.0;
        for &w in &problem.weights {
            let limit = problem.bounds[hosts[pos]];
            if pos < last && load > 0.0 && load + w > limit {
                pos += 1;
                load = 0.0;
            }
            assignment.push(hosts[pos]);
            load += w;
        }

        let moved = rebalance(&problem, &mut assignment);
        debug!(model = model_name, moved, "Linear fill complete");
        Partition::from_indices(model, hardware, &assignment)
    }
}
