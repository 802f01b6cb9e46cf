//! Multilevel graph coarsening.
//!
//! The engine contracts a graph level by level. Each level is an immutable
//! snapshot: `levels[i]` is the graph at level `i` and `mappings[i][v]` is
//! the index of the level `i + 1` vertex that level `i` vertex `v` was merged
//! into. Every mapping is total and surjective onto the next level.
//!
//! ```text
//! level 0 (original) --mappings[0]--> level 1 --mappings[1]--> ... level k
//! ```

use crate::error::GraphError;
use crate::graph::{merge_optional, Label, LabelKind, LabeledGraph};
use simdist_config::CoarseningConfig;
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// Merge rules
// ============================================================================

/// Decides which vertices of a graph are contracted together.
pub trait MergeRule: Send + Sync {
    /// Rule name for logging.
    fn name(&self) -> &'static str;

    /// Cluster index per vertex. Cluster indices must be dense (`0..k`) and
    /// numbered in order of each cluster's lowest vertex index.
    fn clusters(&self, graph: &LabeledGraph) -> Vec<usize>;
}

/// Heavy-edge matching: every unmatched vertex, in index order, is paired
/// with its unmatched neighbor across the heaviest connecting edge.
#[derive(Debug, Clone, Default)]
pub struct HeavyEdgeMatching {
    max_vertex_weight: Option<f64>,
}

impl HeavyEdgeMatching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never produce a merged vertex heavier than `cap`.
    pub fn with_max_vertex_weight(mut self, cap: f64) -> Self {
        self.max_vertex_weight = Some(cap);
        self
    }
}

impl MergeRule for HeavyEdgeMatching {
    fn name(&self) -> &'static str {
        "heavy-edge-matching"
    }

    fn clusters(&self, graph: &LabeledGraph) -> Vec<usize> {
        let adjacency = graph.undirected_adjacency();
        let weights = graph.vertex_weights();
        let cap = self.max_vertex_weight.unwrap_or(f64::INFINITY);

        let mut cluster = vec![usize::MAX; weights.len()];
        let mut next = 0;

        for v in 0..weights.len() {
            if cluster[v] != usize::MAX {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            // adjacency is sorted by index, so strict comparison keeps the lowest index on ties
            for &(u, w) in &adjacency[v] {
                if cluster[u] != usize::MAX || weights[v] + weights[u] > cap {
                    continue;
                }
                if best.is_none_or(|(_, bw)| w > bw) {
                    best = Some((u, w));
                }
            }
            cluster[v] = next;
            if let Some((u, _)) = best {
                cluster[u] = next;
            }
            next += 1;
        }
        cluster
    }
}

// ============================================================================
// Abort criteria
// ============================================================================

/// Decides whether coarsening proceeds past a freshly built level.
pub trait AbortCriterion: Send + Sync {
    /// `level` is the index of `graph`, the most recent level.
    fn should_continue(&self, level: usize, graph: &LabeledGraph) -> bool;
}

/// Continue while the graph has more than `target` vertices.
#[derive(Debug, Clone)]
pub struct VertexCountCriterion {
    pub target: usize,
}

impl AbortCriterion for VertexCountCriterion {
    fn should_continue(&self, _level: usize, graph: &LabeledGraph) -> bool {
        graph.vertex_count() > self.target
    }
}

/// Continue while the graph keeps more than `ratio` of the original vertex count.
#[derive(Debug, Clone)]
pub struct RatioCriterion {
    pub original: usize,
    pub ratio: f64,
}

impl AbortCriterion for RatioCriterion {
    fn should_continue(&self, _level: usize, graph: &LabeledGraph) -> bool {
        graph.vertex_count() as f64 > self.original as f64 * self.ratio
    }
}

/// Continue while fewer than `max` levels have been built.
#[derive(Debug, Clone)]
pub struct MaxLevelsCriterion {
    pub max: usize,
}

impl AbortCriterion for MaxLevelsCriterion {
    fn should_continue(&self, level: usize, _graph: &LabeledGraph) -> bool {
        level < self.max
    }
}

/// Continue only while every inner criterion agrees.
pub struct AllOf(pub Vec<Box<dyn AbortCriterion>>);

impl AbortCriterion for AllOf {
    fn should_continue(&self, level: usize, graph: &LabeledGraph) -> bool {
        self.0.iter().all(|c| c.should_continue(level, graph))
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Level-by-level graph contraction with recorded child → parent maps.
pub struct CoarseningEngine {
    levels: Vec<LabeledGraph>,
    mappings: Vec<Vec<usize>>,
    rule: Box<dyn MergeRule>,
    criterion: Box<dyn AbortCriterion>,
    max_levels: usize,
    min_reduction_ratio: f64,
}

impl std::fmt::Debug for CoarseningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoarseningEngine")
            .field("rule", &self.rule.name())
            .field("level", &self.level())
            .field("max_levels", &self.max_levels)
            .finish()
    }
}

impl CoarseningEngine {
    /// Create an engine over `graph`.
    ///
    /// Contraction merges labels, so graphs mixing text and numeric labels
    /// are rejected.
    pub fn new(
        graph: LabeledGraph,
        rule: Box<dyn MergeRule>,
        criterion: Box<dyn AbortCriterion>,
    ) -> Result<Self, GraphError> {
        if graph.vertex_label_kind() == LabelKind::Mixed {
            return Err(GraphError::MixedLabels("vertex"));
        }
        if graph.edge_label_kind() == LabelKind::Mixed {
            return Err(GraphError::MixedLabels("edge"));
        }
        let defaults = CoarseningConfig::default();
        Ok(Self {
            levels: vec![graph],
            mappings: Vec::new(),
            rule,
            criterion,
            max_levels: defaults.max_levels,
            min_reduction_ratio: defaults.min_reduction_ratio,
        })
    }

    /// Engine for partitioning onto `hosts` hosts: heavy-edge matching,
    /// stopping at `hosts * vertices_per_host` vertices or `max_levels` levels.
    pub fn for_hosts(
        graph: LabeledGraph,
        config: &CoarseningConfig,
        hosts: usize,
        max_merged_weight: Option<f64>,
    ) -> Result<Self, GraphError> {
        let mut rule = HeavyEdgeMatching::new();
        if let Some(cap) = max_merged_weight {
            rule = rule.with_max_vertex_weight(cap);
        }
        let criterion = AllOf(vec![
            Box::new(VertexCountCriterion {
                target: hosts.max(1) * config.vertices_per_host,
            }),
            Box::new(MaxLevelsCriterion {
                max: config.max_levels,
            }),
        ]);
        Ok(Self::new(graph, Box::new(rule), Box::new(criterion))?
            .with_max_levels(config.max_levels)
            .with_min_reduction_ratio(config.min_reduction_ratio))
    }

    /// Hard cap on the number of levels built beyond the original.
    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    /// Stop once a level keeps more than this fraction of its parent's vertices.
    pub fn with_min_reduction_ratio(mut self, ratio: f64) -> Self {
        self.min_reduction_ratio = ratio;
        self
    }

    /// Index of the coarsest level built so far (0 = original).
    pub fn level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Number of levels including the original.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The coarsest graph built so far.
    pub fn coarsest(&self) -> &LabeledGraph {
        &self.levels[self.levels.len() - 1]
    }

    /// Graph at a level.
    pub fn graph_at_level(&self, level: usize) -> Option<&LabeledGraph> {
        self.levels.get(level)
    }

    /// All child → parent maps; `mappings[i]` maps level `i` into level `i + 1`.
    pub fn all_coarsen_mappings(&self) -> &[Vec<usize>] {
        &self.mappings
    }

    /// Build one more level.
    ///
    /// Returns `false` without changing anything when the merge rule finds
    /// nothing to contract (for example a single remaining vertex). A merged
    /// weight that overflows to infinity is an error and also leaves the
    /// engine unchanged.
    pub fn next_coarsening_level(&mut self) -> Result<bool, GraphError> {
        let current = self.coarsest();
        let n = current.vertex_count();
        if n <= 1 {
            return Ok(false);
        }

        let clusters = self.rule.clusters(current);
        let k = clusters.iter().copied().max().map_or(0, |m| m + 1);
        if clusters.len() != n || k >= n {
            return Ok(false);
        }

        let next_level = self.levels.len();
        let coarse = contract(current, &clusters, k, next_level)?;
        debug!(
            level = next_level,
            rule = self.rule.name(),
            "Coarsened {} -> {} vertices",
            n,
            coarse.vertex_count()
        );

        self.levels.push(coarse);
        self.mappings.push(clusters);
        Ok(true)
    }

    /// Coarsen until the criterion stops, no progress is made, the
    /// reduction stalls, or the level cap is reached.
    ///
    /// Returns the number of levels built by this call. On error the levels
    /// built before the failing one are kept.
    pub fn coarsen_graph(&mut self) -> Result<usize, GraphError> {
        let mut built = 0;
        if !self.criterion.should_continue(self.level(), self.coarsest()) {
            return Ok(built);
        }

        while self.level() < self.max_levels {
            let before = self.coarsest().vertex_count();
            if !self.next_coarsening_level()? {
                break;
            }
            built += 1;

            let after = self.coarsest().vertex_count();
            if !self.criterion.should_continue(self.level(), self.coarsest()) {
                break;
            }
            if after as f64 > before as f64 * self.min_reduction_ratio {
                debug!(
                    level = self.level(),
                    "Coarsening stalled ({} -> {} vertices)", before, after
                );
                break;
            }
        }
        Ok(built)
    }

    /// Map from level 0 vertex index to the vertex index at `level`.
    pub fn project_to_level(&self, level: usize) -> Option<Vec<usize>> {
        if level >= self.levels.len() {
            return None;
        }
        let mut map: Vec<usize> = (0..self.levels[0].vertex_count()).collect();
        for mapping in &self.mappings[..level] {
            for slot in map.iter_mut() {
                *slot = mapping[*slot];
            }
        }
        Some(map)
    }

    /// Map a per-vertex assignment at `level` back onto the original vertices.
    pub fn project_assignment<T: Clone>(&self, level: usize, assignment: &[T]) -> Option<Vec<T>> {
        let map = self.project_to_level(level)?;
        map.into_iter().map(|v| assignment.get(v).cloned()).collect()
    }

    /// Map a per-vertex assignment at `level` one level finer.
    pub fn project_one_level<T: Clone>(&self, level: usize, assignment: &[T]) -> Option<Vec<T>> {
        let mapping = self.mappings.get(level.checked_sub(1)?)?;
        mapping.iter().map(|&p| assignment.get(p).cloned()).collect()
    }

    /// Consume the engine, returning the level graphs and mappings.
    pub fn into_levels(self) -> (Vec<LabeledGraph>, Vec<Vec<usize>>) {
        (self.levels, self.mappings)
    }
}

/// Build the contracted graph for a cluster assignment.
///
/// Fails with [`GraphError::InvalidWeight`] when a merged vertex or edge
/// weight is no longer finite.
fn contract(
    graph: &LabeledGraph,
    clusters: &[usize],
    k: usize,
    level: usize,
) -> Result<LabeledGraph, GraphError> {
    let mut weights = vec![0.0; k];
    let mut labels: Vec<Option<Label>> = vec![None; k];
    for (v, vertex) in graph.vertices().enumerate() {
        let c = clusters[v];
        weights[c] += vertex.weight;
        labels[c] = merge_optional(labels[c].as_ref(), vertex.label.as_ref());
    }

    let mut edges: BTreeMap<(usize, usize), (f64, Option<Label>)> = BTreeMap::new();
    for (s, t, data) in graph.edges() {
        let (cs, ct) = (clusters[s], clusters[t]);
        if cs == ct {
            continue;
        }
        let key = if graph.is_directed() {
            (cs, ct)
        } else {
            (cs.min(ct), cs.max(ct))
        };
        let entry = edges.entry(key).or_insert((0.0, None));
        entry.0 += data.weight;
        entry.1 = merge_optional(entry.1.as_ref(), data.label.as_ref());
    }

    let mut coarse = LabeledGraph::new(graph.is_directed(), true);
    let ids: Vec<String> = (0..k).map(|i| format!("{}:{}", level, i)).collect();
    for (i, (weight, label)) in weights.into_iter().zip(labels).enumerate() {
        coarse.add_vertex(ids[i].clone(), weight, label)?;
    }
    for ((s, t), (weight, label)) in edges {
        coarse.add_edge(&ids[s], &ids[t], weight, label)?;
    }
    Ok(coarse)
}
