//! Greedy graph growing partitioner.

use super::balance::{grow_regions, rebalance, refine, Problem};
use super::{AlgorithmDescriptor, LabelSupport, PartitionerKind, PartitioningAlgorithm};
use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use crate::partition::Partition;
use simdist_config::PartitioningConfig;
use tracing::{debug, trace};

/// Number of seeds tried by greedy growing.
const GROWING_TRIES: usize = 8;

/// Grows one connected region per host from a seed vertex, then repairs
/// balance and refines the boundary.
///
/// This is the reference heuristic: on small graphs its cut is checked
/// against [`ExhaustivePartitioner`](super::ExhaustivePartitioner).
#[derive(Debug, Clone)]
pub struct GreedyGrowingPartitioner {
    tolerance: f64,
    refinement_passes: usize,
}

impl GreedyGrowingPartitioner {
    pub const NAME: &'static str = "greedy-growing";

    pub fn new(config: &PartitioningConfig) -> Self {
        Self {
            tolerance: config.balance_tolerance,
            refinement_passes: config.refinement_passes,
        }
    }

    pub fn descriptor() -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            name: Self::NAME,
            description: "greedy graph growing with boundary refinement",
            kind: PartitionerKind::SingleLevel,
            model_labels: LabelSupport::Any,
            hardware_labels: LabelSupport::Any,
            priority: 20,
            constructor: |config| -> Box<dyn PartitioningAlgorithm> {
                Box::new(GreedyGrowingPartitioner::new(config))
            },
        }
    }

    /// Partition a prepared problem, returning host indices.
    ///
    /// Growing is repeated from up to [`GROWING_TRIES`] evenly spaced seeds
    /// and the smallest cut is kept, the earliest seed winning ties.
    pub(crate) fn assign(&self, problem: &Problem) -> Vec<usize> {
        let n = problem.vertex_count();
        let tries = n.min(GROWING_TRIES);
        let mut best: Option<(f64, Vec<usize>)> = None;

        for t in 0..tries {
            let seed = t * n / tries;
            let mut assignment = grow_regions(problem, seed);
            let rebalanced = rebalance(problem, &mut assignment);
            let refined = refine(problem, &mut assignment, self.refinement_passes);
            let cut = problem.cut(&assignment);
            trace!(seed, rebalanced, refined, cut, "Greedy growing try");

            if best.as_ref().is_none_or(|(c, _)| cut < c - 1e-9) {
                best = Some((cut, assignment));
            }
        }

        match best {
            Some((cut, assignment)) => {
                debug!(tries, cut, "Greedy growing complete");
                assignment
            }
            None => grow_regions(problem, 0),
        }
    }
}

impl PartitioningAlgorithm for GreedyGrowingPartitioner {
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
        debug!(model = model_name, "Growing {} regions", problem.usable_hosts().len());
        let assignment = self.assign(&problem);
        Partition::from_indices(model, hardware, &assignment)
    }
}
