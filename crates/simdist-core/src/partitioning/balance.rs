//! Index-level helpers shared by the partitioners: region growing, balance
//! repair and boundary refinement.
//!
//! Assignments are `Vec<usize>` holding a hardware vertex index per model
//! vertex index. Every helper is deterministic: ties go to the lowest index.

use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use crate::partition::{capacity_shares, load_bounds};

const EPSILON: f64 = 1e-9;
const UNASSIGNED: usize = usize::MAX;

/// A graph prepared for partitioning onto a fixed set of hosts.
#[derive(Debug, Clone)]
pub(crate) struct Problem {
    pub adjacency: Vec<Vec<(usize, f64)>>,
    pub weights: Vec<f64>,
    /// Target load per host
    pub shares: Vec<f64>,
    /// Maximum load per host
    pub bounds: Vec<f64>,
    /// An assignment known to respect `bounds`
    fallback: Vec<usize>,
    /// Capacity fraction per host, for relative load comparisons
    fractions: Vec<f64>,
}

impl Problem {
    pub fn new(
        graph: &LabeledGraph,
        hardware: &LabeledGraph,
        tolerance: f64,
    ) -> Result<Self, PartitioningError> {
        let shares = capacity_shares(graph, hardware)?;
        let capacity = hardware.total_vertex_weight();
        let capacities: Vec<f64> = hardware.vertices().map(|h| h.weight).collect();
        let fractions = capacities.iter().map(|c| c / capacity).collect();
        let weights = graph.vertex_weights();
        let (bounds, fallback) = load_bounds(&weights, &capacities, tolerance);

        Ok(Self {
            adjacency: graph.undirected_adjacency(),
            weights,
            shares,
            bounds,
            fallback,
            fractions,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.weights.len()
    }

    pub fn host_count(&self) -> usize {
        self.shares.len()
    }

    /// Hosts with positive capacity, in index order.
    pub fn usable_hosts(&self) -> Vec<usize> {
        (0..self.host_count())
            .filter(|&h| self.fractions[h] > 0.0)
            .collect()
    }

    pub fn loads(&self, assignment: &[usize]) -> Vec<f64> {
        let mut loads = vec![0.0; self.host_count()];
        for (v, &h) in assignment.iter().enumerate() {
            loads[h] += self.weights[v];
        }
        loads
    }

    /// Total weight of edges crossing hosts.
    pub fn cut(&self, assignment: &[usize]) -> f64 {
        let mut cut = 0.0;
        for (v, neighbors) in self.adjacency.iter().enumerate() {
            for &(u, w) in neighbors {
                if u > v && assignment[u] != assignment[v] {
                    cut += w;
                }
            }
        }
        cut
    }

    pub fn is_balanced(&self, assignment: &[usize]) -> bool {
        self.loads(assignment)
            .iter()
            .zip(&self.bounds)
            .all(|(l, b)| *l <= b + EPSILON)
    }

    fn fits(&self, load: f64, weight: f64, host: usize) -> bool {
        load + weight <= self.bounds[host] + EPSILON
    }

    /// Connectivity of a vertex to each host under an assignment.
    fn connectivity(&self, v: usize, assignment: &[usize], conn: &mut [f64]) {
        conn.iter_mut().for_each(|c| *c = 0.0);
        for &(u, w) in &self.adjacency[v] {
            if assignment[u] != UNASSIGNED {
                conn[assignment[u]] += w;
            }
        }
    }
}

/// Greedy graph growing.
///
/// Hosts are filled one at a time up to their share, never past their bound.
/// The first region starts
/// at `seed`, later ones at the lowest unassigned vertex. A region absorbs the
/// frontier vertex with the best gain (connectivity to the region minus
/// connectivity to the rest). The last usable host takes whatever is left.
pub(crate) fn grow_regions(problem: &Problem, seed: usize) -> Vec<usize> {
    let n = problem.vertex_count();
    let mut assignment = vec![UNASSIGNED; n];
    let hosts = problem.usable_hosts();
    let Some((&last, growing)) = hosts.split_last() else {
        return vec![0; n];
    };

    let mut remaining = n;
    let mut seed = (seed < n).then_some(seed);
    for &h in growing {
        if remaining == 0 {
            break;
        }
        let target = problem.shares[h];
        let limit = problem.bounds[h];
        let mut load = 0.0;
        let mut to_region = vec![0.0; n];

        while remaining > 0 && load < target - EPSILON {
            let next = best_frontier_vertex(problem, &assignment, &to_region, load, limit)
                .or_else(|| seed.take())
                .or_else(|| {
                    (0..n).find(|&v| {
                        assignment[v] == UNASSIGNED
                            && (load == 0.0 || load + problem.weights[v] <= limit + EPSILON)
                    })
                });
            let Some(v) = next else {
                break;
            };

            assignment[v] = h;
            load += problem.weights[v];
            remaining -= 1;
            for &(u, w) in &problem.adjacency[v] {
                to_region[u] += w;
            }
        }
    }

    for slot in assignment.iter_mut().filter(|s| **s == UNASSIGNED) {
        *slot = last;
    }
    assignment
}

fn best_frontier_vertex(
    problem: &Problem,
    assignment: &[usize],
    to_region: &[f64],
    load: f64,
    limit: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for v in 0..problem.vertex_count() {
        if assignment[v] != UNASSIGNED || to_region[v] <= 0.0 {
            continue;
        }
        if load + problem.weights[v] > limit + EPSILON {
            continue;
        }
        let to_rest: f64 = problem.adjacency[v]
            .iter()
            .filter(|(u, _)| assignment[*u] == UNASSIGNED)
            .map(|(_, w)| w)
            .sum();
        let gain = to_region[v] - to_rest;
        if best.is_none_or(|(_, g)| gain > g + EPSILON) {
            best = Some((v, gain));
        }
    }
    best.map(|(v, _)| v)
}

/// Move vertices off overloaded hosts until every host is within bounds.
///
/// Each move takes the vertex and destination with the best cut gain among
/// moves that keep the destination within its bound. If no such move
/// exists the assignment is replaced by the heaviest-first packing the
/// bounds were derived from.
///
/// Returns the number of vertices moved.
pub(crate) fn rebalance(problem: &Problem, assignment: &mut Vec<usize>) -> usize {
    let mut loads = problem.loads(assignment);
    let mut conn = vec![0.0; problem.host_count()];
    let mut moves = 0;

    loop {
        let Some(over) = (0..problem.host_count()).find(|&h| loads[h] > problem.bounds[h] + EPSILON)
        else {
            return moves;
        };

        let mut best: Option<(usize, usize, f64)> = None;
        for v in 0..problem.vertex_count() {
            let w = problem.weights[v];
            if assignment[v] != over || w <= 0.0 {
                continue;
            }
            problem.connectivity(v, assignment, &mut conn);
            for b in problem.usable_hosts() {
                if b == over || !problem.fits(loads[b], w, b) {
                    continue;
                }
                let gain = conn[b] - conn[over];
                if best.is_none_or(|(_, _, g)| gain > g + EPSILON) {
                    best = Some((v, b, gain));
                }
            }
        }

        let Some((v, b, _)) = best else {
            *assignment = problem.fallback.clone();
            return moves + problem.vertex_count();
        };
        loads[over] -= problem.weights[v];
        loads[b] += problem.weights[v];
        assignment[v] = b;
        moves += 1;
    }
}

/// Boundary refinement: repeatedly move single vertices to the host they
/// are most connected to when that strictly reduces the cut and keeps the
/// destination within its bound.
///
/// Returns the number of vertices moved.
pub(crate) fn refine(problem: &Problem, assignment: &mut [usize], passes: usize) -> usize {
    let mut loads = problem.loads(assignment);
    let mut conn = vec![0.0; problem.host_count()];
    let mut total = 0;

    for _ in 0..passes {
        let mut moved = 0;
        for v in 0..problem.vertex_count() {
            let a = assignment[v];
            let w = problem.weights[v];
            problem.connectivity(v, assignment, &mut conn);

            let mut best: Option<(usize, f64)> = None;
            for b in 0..problem.host_count() {
                if b == a || conn[b] <= 0.0 || !problem.fits(loads[b], w, b) {
                    continue;
                }
                let gain = conn[b] - conn[a];
                if gain > EPSILON && best.is_none_or(|(_, g)| gain > g + EPSILON) {
                    best = Some((b, gain));
                }
            }

            if let Some((b, _)) = best {
                loads[a] -= w;
                loads[b] += w;
                assignment[v] = b;
                moved += 1;
            }
        }
        total += moved;
        if moved == 0 {
            break;
        }
    }
    total
}
