//! Brute-force minimum-cut partitioner for tiny graphs.

use super::balance::Problem;
use super::{AlgorithmDescriptor, LabelSupport, PartitionerKind, PartitioningAlgorithm};
use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use crate::partition::Partition;
use rayon::prelude::*;
use simdist_config::PartitioningConfig;
use tracing::debug;

/// Upper bound on the number of assignments searched.
const MAX_ASSIGNMENTS: u64 = 1 << 24;

/// Enumerates every assignment and keeps the balanced one with the smallest
/// cut. Exact, and exponential in the number of model vertices.
///
/// Among equal cuts the assignment whose host sequence (vertex 0 first) is
/// lexicographically smallest wins, so the result is deterministic.
#[derive(Debug, Clone)]
pub struct ExhaustivePartitioner {
    tolerance: f64,
    max_vertices: usize,
}

impl ExhaustivePartitioner {
    pub const NAME: &'static str = "exhaustive";

    pub fn new(config: &PartitioningConfig) -> Self {
        Self {
            tolerance: config.balance_tolerance,
            max_vertices: config.exhaustive_max_vertices,
        }
    }

    pub fn descriptor() -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            name: Self::NAME,
            description: "exact minimum cut by exhaustive search (tiny graphs only)",
            kind: PartitionerKind::SingleLevel,
            model_labels: LabelSupport::Any,
            hardware_labels: LabelSupport::Any,
            priority: 5,
            constructor: |config| -> Box<dyn PartitioningAlgorithm> {
                Box::new(ExhaustivePartitioner::new(config))
            },
        }
    }
}

/// Host index of vertex `v` in assignment number `code`.
fn digit(code: u64, v: usize, n: usize, hosts: u64) -> usize {
    let exp = (n - 1 - v) as u32;
    ((code / hosts.pow(exp)) % hosts) as usize
}

impl PartitioningAlgorithm for ExhaustivePartitioner {
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
        let n = problem.vertex_count();
        if n == 0 {
            return Ok(Partition::new());
        }

        let hosts = problem.host_count() as u64;
        let total = u32::try_from(n)
            .ok()
            .and_then(|exp| hosts.checked_pow(exp))
            .filter(|&t| t <= MAX_ASSIGNMENTS);
        let total = match total {
            Some(t) if n <= self.max_vertices => t,
            _ => {
                return Err(PartitioningError::TooLarge {
                    model: model_name.to_string(),
                    algorithm: Self::NAME,
                    vertices: n,
                    max: self.max_vertices,
                })
            }
        };

        debug!(model = model_name, assignments = total, "Exhaustive search");

        let best = (0..total)
            .into_par_iter()
            .filter_map(|code| {
                let assignment: Vec<usize> =
                    (0..n).map(|v| digit(code, v, n, hosts)).collect();
                problem
                    .is_balanced(&assignment)
                    .then(|| (problem.cut(&assignment), code))
            })
            .reduce_with(|a, b| {
                match a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)) {
                    std::cmp::Ordering::Greater => b,
                    _ => a,
                }
            });

        let Some((cut, code)) = best else {
            return Err(PartitioningError::ineligible(
                Self::NAME,
                "no balanced assignment exists",
            ));
        };
        debug!(model = model_name, cut, "Exhaustive optimum found");

        let assignment: Vec<usize> = (0..n).map(|v| digit(code, v, n, hosts)).collect();
        Partition::from_indices(model, hardware, &assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hosts(n: usize) -> LabeledGraph {
        let mut hw = LabeledGraph::default();
        for i in 0..n {
            hw.add_vertex(format!("h{}", i), 1.0, None).unwrap();
        }
        hw
    }

    #[test]
    fn test_digit_decoding() {
        // 0b0111 with vertex 0 most significant
        assert_eq!(
            (0..4).map(|v| digit(7, v, 4, 2)).collect::<Vec<_>>(),
            vec![0, 1, 1, 1]
        );
        assert_eq!(digit(5, 0, 2, 3), 1);
        assert_eq!(digit(5, 1, 2, 3), 2);
    }

    #[test]
    fn test_finds_minimum_cut() {
        // two heavy pairs joined by a light edge
        let mut model = LabeledGraph::default();
        for v in ["a", "b", "c", "d"] {
            model.add_vertex(v, 1.0, None).unwrap();
        }
        model.add_edge("a", "c", 5.0, None).unwrap();
        model.add_edge("b", "d", 5.0, None).unwrap();
        model.add_edge("a", "b", 1.0, None).unwrap();

        let p = ExhaustivePartitioner::new(&PartitioningConfig::default())
            .run("pairs", &model, &hosts(2))
            .unwrap();
        assert_eq!(p.cut_weight(&model), 1.0);
        assert_eq!(p.host_of("a"), Some("h0"));
        assert_eq!(p.host_of("c"), Some("h0"));
    }

    #[test]
    fn test_rejects_large_models() {
        let mut model = LabeledGraph::default();
        for i in 0..5 {
            model.add_vertex(format!("v{}", i), 1.0, None).unwrap();
        }
        let config = PartitioningConfig {
            exhaustive_max_vertices: 4,
            ..Default::default()
        };
        let err = ExhaustivePartitioner::new(&config)
            .run("big", &model, &hosts(2))
            .unwrap_err();
        assert!(matches!(err, PartitioningError::TooLarge { vertices: 5, .. }));
    }

    #[test]
    fn test_empty_model() {
        let p = ExhaustivePartitioner::new(&PartitioningConfig::default())
            .run("empty", &LabeledGraph::default(), &hosts(2))
            .unwrap();
        assert!(p.is_empty());
    }
}
