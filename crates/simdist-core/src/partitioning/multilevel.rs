//! Multilevel partitioner: coarsen, partition the coarsest graph, then
//! project back level by level with refinement.

use super::balance::{rebalance, refine, Problem};
use super::greedy::GreedyGrowingPartitioner;
use super::{AlgorithmDescriptor, LabelSupport, PartitionerKind, PartitioningAlgorithm};
use crate::coarsening::CoarseningEngine;
use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use crate::partition::{capacity_shares, Partition};
use simdist_config::{CoarseningConfig, PartitioningConfig};
use tracing::debug;

/// Coarsens the model with heavy-edge matching, runs greedy growing on the
/// coarsest graph, then walks back down the levels projecting the
/// assignment and refining it at each one.
///
/// Contraction merges vertex and edge labels, so model graphs mixing text
/// and numeric labels are not supported.
#[derive(Debug, Clone)]
pub struct MultilevelPartitioner {
    tolerance: f64,
    refinement_passes: usize,
    coarsening: CoarseningConfig,
    initial: GreedyGrowingPartitioner,
}

impl MultilevelPartitioner {
    pub const NAME: &'static str = "multilevel";

    pub fn new(config: &PartitioningConfig) -> Self {
        Self {
            tolerance: config.balance_tolerance,
            refinement_passes: config.refinement_passes,
            coarsening: config.coarsening.clone(),
            initial: GreedyGrowingPartitioner::new(config),
        }
    }

    pub fn descriptor() -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            name: Self::NAME,
            description: "heavy-edge coarsening, greedy growing, per-level refinement",
            kind: PartitionerKind::MultiLevel,
            model_labels: LabelSupport::Homogeneous,
            hardware_labels: LabelSupport::Any,
            priority: 30,
            constructor: |config| -> Box<dyn PartitioningAlgorithm> {
                Box::new(MultilevelPartitioner::new(config))
            },
        }
    }
}

impl PartitioningAlgorithm for MultilevelPartitioner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(
        &self,
        model_name: &str,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<Partition, PartitioningError> {
        let shares = capacity_shares(model, hardware)?;
        if model.is_empty() {
            return Ok(Partition::new());
        }

        // a merged vertex never outweighs the smallest positive share
        let cap = shares
            .iter()
            .copied()
            .filter(|&s| s > 0.0)
            .fold(f64::INFINITY, f64::min);
        let usable = shares.iter().filter(|&&s| s > 0.0).count();

        let mut engine =
            CoarseningEngine::for_hosts(model.clone(), &self.coarsening, usable, Some(cap))?;
        engine.coarsen_graph()?;
        let (levels, mappings) = engine.into_levels();
        debug!(
            model = model_name,
            levels = levels.len(),
            coarsest = levels[levels.len() - 1].vertex_count(),
            "Coarsening finished"
        );

        let coarsest = Problem::new(&levels[levels.len() - 1], hardware, self.tolerance)?;
        let mut assignment = self.initial.assign(&coarsest);

        for level in (0..mappings.len()).rev() {
            assignment = mappings[level].iter().map(|&c| assignment[c]).collect();
            let problem = Problem::new(&levels[level], hardware, self.tolerance)?;
            let rebalanced = rebalance(&problem, &mut assignment);
            let refined = refine(&problem, &mut assignment, self.refinement_passes);
            debug!(
                model = model_name,
                level,
                rebalanced,
                refined,
                cut = problem.cut(&assignment),
                "Projected partition"
            );
        }

        Partition::from_indices(model, hardware, &assignment)
    }
}
