//! Partition result and quality metrics.

use crate::error::PartitioningError;
use crate::graph::LabeledGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Slack for floating point comparisons on loads.
const LOAD_EPSILON: f64 = 1e-9;

/// Assignment of model vertices to hosts.
///
/// Keys are model vertex ids, values are hardware vertex ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition {
    assignment: BTreeMap<String, String>,
}

/// Summary statistics for a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub vertices: usize,
    pub hosts: usize,
    pub hosts_used: usize,
    pub cut_weight: f64,
    pub communication_cost: f64,
    /// Largest `load / share` over all hosts with a positive share
    pub max_relative_load: f64,
    pub balanced: bool,
}

/// Per-host capacity share of the model's total weight.
///
/// `s(h) = W * c(h) / sum(c)`, indexed like the hardware graph's vertices.
pub fn capacity_shares(
    model: &LabeledGraph,
    hardware: &LabeledGraph,
) -> Result<Vec<f64>, PartitioningError> {
    if hardware.is_empty() {
        return Err(PartitioningError::NoHosts);
    }
    let capacity = hardware.total_vertex_weight();
    if capacity <= 0.0 {
        return Err(PartitioningError::ZeroCapacity);
    }
    let total = model.total_vertex_weight();
    Ok(hardware
        .vertices()
        .map(|h| total * h.weight / capacity)
        .collect())
}

/// Upper load bound per host, indexed like the hardware graph's vertices.
///
/// The bound is `share * (1 + tolerance)`. When indivisible vertex weights
/// keep both a first-fit and a balanced heaviest-first packing from meeting
/// it, every host is relaxed by the same factor, just far enough to admit
/// the balanced packing. Hosts without capacity get a bound of zero.
pub fn balance_bounds(
    model: &LabeledGraph,
    hardware: &LabeledGraph,
    tolerance: f64,
) -> Result<Vec<f64>, PartitioningError> {
    capacity_shares(model, hardware)?;
    let capacities: Vec<f64> = hardware.vertices().map(|h| h.weight).collect();
    let (bounds, _) = load_bounds(&model.vertex_weights(), &capacities, tolerance);
    Ok(bounds)
}

/// Bounds per host plus a host index per weight that satisfies them.
pub(crate) fn load_bounds(
    weights: &[f64],
    capacities: &[f64],
    tolerance: f64,
) -> (Vec<f64>, Vec<usize>) {
    let total: f64 = weights.iter().sum();
    let capacity: f64 = capacities.iter().filter(|c| **c > 0.0).sum();
    let shares: Vec<f64> = capacities
        .iter()
        .map(|&c| if c > 0.0 { total * c / capacity } else { 0.0 })
        .collect();
    let strict: Vec<f64> = shares.iter().map(|s| s * (1.0 + tolerance)).collect();

    let order = heaviest_first(weights);
    if let Some(packing) = first_fit(weights, &order, capacities, &strict) {
        return (strict, packing);
    }

    let packing = balanced_fit(weights, &order, capacities);
    let mut packed = vec![0.0; capacities.len()];
    for (v, &h) in packing.iter().enumerate() {
        packed[h] += weights[v];
    }
    let factor = packed
        .iter()
        .zip(&shares)
        .filter(|(_, s)| **s > 0.0)
        .map(|(l, s)| l / s)
        .fold(1.0 + tolerance, f64::max);
    let bounds = shares
        .iter()
        .zip(&packed)
        .map(|(&s, &l)| if s > 0.0 { (s * factor).max(l) } else { 0.0 })
        .collect();
    (bounds, packing)
}

/// Weight indices by descending weight, ties by index.
fn heaviest_first(weights: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)));
    order
}

/// Each weight goes to the lowest-index host with capacity that still has
/// room under its limit.
fn first_fit(
    weights: &[f64],
    order: &[usize],
    capacities: &[f64],
    limits: &[f64],
) -> Option<Vec<usize>> {
    let mut loads = vec![0.0; capacities.len()];
    let mut assignment = vec![0; weights.len()];
    for &v in order {
        let h = (0..capacities.len()).find(|&h| {
            capacities[h] > 0.0 && loads[h] + weights[v] <= limits[h] + LOAD_EPSILON
        })?;
        loads[h] += weights[v];
        assignment[v] = h;
    }
    Some(assignment)
}

/// Each weight goes to the host whose `load / capacity` ends up lowest, ties
/// to the lower index. Hosts without capacity receive nothing.
fn balanced_fit(weights: &[f64], order: &[usize], capacities: &[f64]) -> Vec<usize> {
    let mut loads = vec![0.0; capacities.len()];
    let mut assignment = vec![0; weights.len()];
    for &v in order {
        let mut best: Option<(usize, f64)> = None;
        for (h, &c) in capacities.iter().enumerate() {
            if c <= 0.0 {
                continue;
            }
            let relative = (loads[h] + weights[v]) / c;
            if best.is_none_or(|(_, r)| relative < r - LOAD_EPSILON) {
                best = Some((h, relative));
            }
        }
        // callers have checked that some host has capacity
        let h = best.map_or(0, |(h, _)| h);
        loads[h] += weights[v];
        assignment[v] = h;
    }
    assignment
}

impl Partition {
    /// Create an empty partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a partition from a host index per model vertex index.
    pub fn from_indices(
        model: &LabeledGraph,
        hardware: &LabeledGraph,
        hosts: &[usize],
    ) -> Result<Self, PartitioningError> {
        let mut partition = Self::new();
        for (v, &h) in hosts.iter().enumerate() {
            let vertex = model
                .vertex(v)
                .ok_or_else(|| PartitioningError::not_total(format!("no model vertex {}", v)))?;
            let host = hardware
                .vertex(h)
                .ok_or_else(|| PartitioningError::not_total(format!("no host index {}", h)))?;
            partition.assign(vertex.id.clone(), host.id.clone());
        }
        Ok(partition)
    }

    /// Assign a model vertex to a host, replacing any earlier assignment.
    pub fn assign(&mut self, vertex: impl Into<String>, host: impl Into<String>) {
        self.assignment.insert(vertex.into(), host.into());
    }

    /// Host of a model vertex.
    pub fn host_of(&self, vertex: &str) -> Option<&str> {
        self.assignment.get(vertex).map(String::as_str)
    }

    /// Number of assigned vertices.
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// Check if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Iterate `(vertex, host)` pairs ordered by vertex id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignment
            .iter()
            .map(|(v, h)| (v.as_str(), h.as_str()))
    }

    /// Hosts that received at least one vertex.
    pub fn hosts_used(&self) -> BTreeSet<&str> {
        self.assignment.values().map(String::as_str).collect()
    }

    /// Vertices assigned to a host, ordered by id.
    pub fn vertices_on(&self, host: &str) -> Vec<&str> {
        self.iter()
            .filter(|(_, h)| *h == host)
            .map(|(v, _)| v)
            .collect()
    }

    /// Total model weight per host. Hosts without vertices are omitted.
    pub fn loads(&self, model: &LabeledGraph) -> BTreeMap<String, f64> {
        let mut loads = BTreeMap::new();
        for vertex in model.vertices() {
            if let Some(host) = self.host_of(&vertex.id) {
                *loads.entry(host.to_string()).or_insert(0.0) += vertex.weight;
            }
        }
        loads
    }

    /// Sum of weights of model edges whose endpoints sit on different hosts.
    pub fn cut_weight(&self, model: &LabeledGraph) -> f64 {
        self.cut_edges(model).map(|(_, _, w)| w).sum()
    }

    /// Cut weight priced by the hardware hop cost between the two hosts.
    pub fn communication_cost(&self, model: &LabeledGraph, hardware: &LabeledGraph) -> f64 {
        let hops = hardware.hop_costs();
        self.cut_edges(model)
            .map(|(a, b, w)| {
                match (hardware.index_of(a), hardware.index_of(b)) {
                    (Some(i), Some(j)) => w * hops[i][j],
                    _ => f64::INFINITY,
                }
            })
            .sum()
    }

    fn cut_edges<'a>(
        &'a self,
        model: &'a LabeledGraph,
    ) -> impl Iterator<Item = (&'a str, &'a str, f64)> + 'a {
        model.edges().filter_map(move |(s, t, data)| {
            let a = self.host_of(&model.vertex(s)?.id)?;
            let b = self.host_of(&model.vertex(t)?.id)?;
            (a != b).then_some((a, b, data.weight))
        })
    }

    /// Verify that every model vertex is assigned to exactly one existing host
    /// and that no unknown vertex is assigned.
    pub fn validate_total(
        &self,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
    ) -> Result<(), PartitioningError> {
        for vertex in model.vertices() {
            match self.host_of(&vertex.id) {
                None => {
                    return Err(PartitioningError::not_total(format!(
                        "vertex '{}' is unassigned",
                        vertex.id
                    )))
                }
                Some(host) if !hardware.contains_vertex(host) => {
                    return Err(PartitioningError::not_total(format!(
                        "vertex '{}' is assigned to unknown host '{}'",
                        vertex.id, host
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some((extra, _)) = self.iter().find(|(v, _)| !model.contains_vertex(v)) {
            return Err(PartitioningError::not_total(format!(
                "vertex '{}' is not in the model graph",
                extra
            )));
        }
        Ok(())
    }

    /// Verify every host stays within its balance bound.
    pub fn check_balance(
        &self,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
        tolerance: f64,
    ) -> Result<(), PartitioningError> {
        if model.is_empty() {
            return Ok(());
        }
        let bounds = balance_bounds(model, hardware, tolerance)?;
        let loads = self.loads(model);

        for (host, bound) in hardware.vertices().zip(bounds) {
            let load = loads.get(&host.id).copied().unwrap_or(0.0);
            if load > bound + LOAD_EPSILON {
                return Err(PartitioningError::Unbalanced {
                    host: host.id.clone(),
                    load,
                    bound,
                });
            }
        }
        Ok(())
    }

    /// Compute summary statistics.
    pub fn stats(
        &self,
        model: &LabeledGraph,
        hardware: &LabeledGraph,
        tolerance: f64,
    ) -> PartitionStats {
        let loads = self.loads(model);
        let max_relative_load = capacity_shares(model, hardware)
            .map(|shares| {
                hardware
                    .vertices()
                    .zip(shares)
                    .filter(|(_, s)| *s > 0.0)
                    .map(|(h, s)| loads.get(&h.id).copied().unwrap_or(0.0) / s)
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0);

        PartitionStats {
            vertices: self.len(),
            hosts: hardware.vertex_count(),
            hosts_used: self.hosts_used().len(),
            cut_weight: self.cut_weight(model),
            communication_cost: self.communication_cost(model, hardware),
            max_relative_load,
            balanced: self.check_balance(model, hardware, tolerance).is_ok(),
        }
    }
}

impl FromIterator<(String, String)> for Partition {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            assignment: iter.into_iter().collect(),
        }
    }
}
