//! Labeled graph model shared by model graphs and hardware graphs.
//!
//! A model graph describes simulation components (vertices, weighted by
//! computational cost) and their interactions (edges, weighted by traffic).
//! A hardware graph describes compute hosts (vertices, weighted by relative
//! capacity) and network links (edges, weighted by link cost).
//!
//! Vertices are stored densely in insertion order: the vertex index returned
//! by [`LabeledGraph::add_vertex`] is stable for the lifetime of the graph and
//! doubles as the deterministic tie-breaker in every algorithm.

use crate::error::GraphError;
use petgraph::algo::dijkstra;
use petgraph::graph::{Graph, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

// ============================================================================
// Labels
// ============================================================================

/// Vertex or edge label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Numeric(f64),
}

impl Label {
    /// Kind of this label.
    pub fn kind(&self) -> LabelKind {
        match self {
            Label::Text(_) => LabelKind::Text,
            Label::Numeric(_) => LabelKind::Numeric,
        }
    }

    /// Merge two labels of contracted elements.
    ///
    /// Text labels are joined with `+`, numeric labels are summed. Mixed
    /// kinds have no merge and yield `None`.
    pub fn merge(&self, other: &Label) -> Option<Label> {
        match (self, other) {
            (Label::Text(a), Label::Text(b)) => Some(Label::Text(format!("{}+{}", a, b))),
            (Label::Numeric(a), Label::Numeric(b)) => Some(Label::Numeric(a + b)),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Text(s) => write!(f, "{}", s),
            Label::Numeric(n) => write!(f, "{}", n),
        }
    }
}

/// Summary of the labels carried by a graph's vertices or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// No element carries a label
    None,
    /// Only text labels
    Text,
    /// Only numeric labels
    Numeric,
    /// Both text and numeric labels
    Mixed,
}

impl LabelKind {
    /// Fold another observed label kind into this summary.
    pub fn combine(self, other: LabelKind) -> LabelKind {
        match (self, other) {
            (LabelKind::None, k) | (k, LabelKind::None) => k,
            (a, b) if a == b => a,
            _ => LabelKind::Mixed,
        }
    }

    /// Summarize an iterator of optional labels.
    pub fn of<'a>(labels: impl IntoIterator<Item = Option<&'a Label>>) -> LabelKind {
        labels
            .into_iter()
            .flatten()
            .fold(LabelKind::None, |acc, l| acc.combine(l.kind()))
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LabelKind::None => "none",
            LabelKind::Text => "text",
            LabelKind::Numeric => "numeric",
            LabelKind::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// Merge two optional labels, keeping whichever side is present.
pub(crate) fn merge_optional(a: Option<&Label>, b: Option<&Label>) -> Option<Label> {
    match (a, b) {
        (Some(a), Some(b)) => a.merge(b),
        (Some(l), None) | (None, Some(l)) => Some(l.clone()),
        (None, None) => None,
    }
}

// ============================================================================
// Elements
// ============================================================================

/// A graph vertex: opaque id, weight and optional label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub weight: f64,
    pub label: Option<Label>,
}

/// Payload of a graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub weight: f64,
    pub label: Option<Label>,
}

// ============================================================================
// Description (external input format)
// ============================================================================

fn default_weight() -> f64 {
    1.0
}

fn default_simple() -> bool {
    true
}

/// Full vertex record in a graph description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexDescription {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// A vertex entry: either a bare id (weight 1, no label) or a full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VertexSpec {
    Bare(String),
    Full(VertexDescription),
}

impl VertexSpec {
    fn into_description(self) -> VertexDescription {
        match self {
            VertexSpec::Bare(id) => VertexDescription {
                id,
                weight: default_weight(),
                label: None,
            },
            VertexSpec::Full(d) => d,
        }
    }
}

/// Edge record in a graph description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub source: String,
    pub target: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// Serializable description of a graph, as supplied by model-description
/// and hardware-topology collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub vertices: Vec<VertexSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
    #[serde(default)]
    pub directed: bool,
    #[serde(default = "default_simple")]
    pub simple: bool,
}

// ============================================================================
// LabeledGraph
// ============================================================================

/// Weighted, labeled graph backed by petgraph.
#[derive(Debug, Clone)]
pub struct LabeledGraph {
    graph: Graph<Vertex, EdgeData>,
    index_map: HashMap<String, NodeIndex>,
    directed: bool,
    simple: bool,
}

impl Default for LabeledGraph {
    fn default() -> Self {
        Self::new(false, true)
    }
}

impl LabeledGraph {
    /// Create an empty graph.
    pub fn new(directed: bool, simple: bool) -> Self {
        Self {
            graph: Graph::new(),
            index_map: HashMap::new(),
            directed,
            simple,
        }
    }

    /// Build a graph from a description, validating every element.
    pub fn from_description(desc: GraphDescription) -> Result<Self, GraphError> {
        let mut graph = Self::new(desc.directed, desc.simple);
        for spec in desc.vertices {
            let v = spec.into_description();
            graph.add_vertex(v.id, v.weight, v.label)?;
        }
        for e in desc.edges {
            graph.add_edge(&e.source, &e.target, e.weight, e.label)?;
        }
        Ok(graph)
    }

    /// Parse a JSON graph description.
    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        let desc: GraphDescription = serde_json::from_str(json)?;
        Self::from_description(desc)
    }

    /// Load a JSON graph description from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        Self::from_json_str(&content)
    }

    /// Convert back into a description.
    pub fn to_description(&self) -> GraphDescription {
        let vertices = self
            .vertices()
            .map(|v| {
                VertexSpec::Full(VertexDescription {
                    id: v.id.clone(),
                    weight: v.weight,
                    label: v.label.clone(),
                })
            })
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| EdgeDescription {
                source: self.graph[e.source()].id.clone(),
                target: self.graph[e.target()].id.clone(),
                weight: e.weight().weight,
                label: e.weight().label.clone(),
            })
            .collect();
        GraphDescription {
            vertices,
            edges,
            directed: self.directed,
            simple: self.simple,
        }
    }

    /// Whether edges are directed.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Whether self loops and parallel edges are rejected.
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    /// Add a vertex and return its index.
    pub fn add_vertex(
        &mut self,
        id: impl Into<String>,
        weight: f64,
        label: Option<Label>,
    ) -> Result<usize, GraphError> {
        let id = id.into();
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::invalid_weight(format!("vertex '{}'", id), weight));
        }
        if self.index_map.contains_key(&id) {
            return Err(GraphError::DuplicateVertex(id));
        }
        let idx = self.graph.add_node(Vertex {
            id: id.clone(),
            weight,
            label,
        });
        self.index_map.insert(id, idx);
        Ok(idx.index())
    }

    /// Add an edge between two existing vertices.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        weight: f64,
        label: Option<Label>,
    ) -> Result<(), GraphError> {
        let s = self
            .index_map
            .get(source)
            .copied()
            .ok_or_else(|| GraphError::dangling(source, target, source))?;
        let t = self
            .index_map
            .get(target)
            .copied()
            .ok_or_else(|| GraphError::dangling(source, target, target))?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::invalid_weight(
                format!("edge {} -> {}", source, target),
                weight,
            ));
        }
        if self.simple {
            if s == t {
                return Err(GraphError::SelfLoop(source.to_string()));
            }
            let parallel = self.graph.find_edge(s, t).is_some()
                || (!self.directed && self.graph.find_edge(t, s).is_some());
            if parallel {
                return Err(GraphError::ParallelEdge {
                    source_id: source.to_string(),
                    target_id: target.to_string(),
                });
            }
        }
        self.graph.add_edge(s, t, EdgeData { weight, label });
        Ok(())
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Sum of all vertex weights.
    pub fn total_vertex_weight(&self) -> f64 {
        self.vertices().map(|v| v.weight).sum()
    }

    /// Weight of the heaviest vertex (0 for an empty graph).
    pub fn max_vertex_weight(&self) -> f64 {
        self.vertices().map(|v| v.weight).fold(0.0, f64::max)
    }

    /// Vertex at an index.
    pub fn vertex(&self, index: usize) -> Option<&Vertex> {
        self.graph.node_weight(NodeIndex::new(index))
    }

    /// Vertex by id.
    pub fn vertex_by_id(&self, id: &str) -> Option<&Vertex> {
        self.index_map.get(id).map(|&idx| &self.graph[idx])
    }

    /// Index of a vertex id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_map.get(id).map(|idx| idx.index())
    }

    /// Check if a vertex id exists.
    pub fn contains_vertex(&self, id: &str) -> bool {
        self.index_map.contains_key(id)
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.graph.node_weights()
    }

    /// Vertex weights in insertion order.
    pub fn vertex_weights(&self) -> Vec<f64> {
        self.vertices().map(|v| v.weight).collect()
    }

    /// Edges as `(source index, target index, data)` in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, &EdgeData)> {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), e.weight()))
    }

    /// Distinct neighbors of a vertex in either direction, sorted by index.
    pub fn neighbors(&self, index: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_undirected(NodeIndex::new(index))
            .map(|n| n.index())
            .filter(|&n| n != index)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Total weight of all edges between two vertices, in either direction.
    pub fn edge_weight_between(&self, a: usize, b: usize) -> f64 {
        let (na, nb) = (NodeIndex::new(a), NodeIndex::new(b));
        let forward: f64 = self
            .graph
            .edges_connecting(na, nb)
            .map(|e| e.weight().weight)
            .sum();
        if a == b {
            return forward;
        }
        let backward: f64 = self
            .graph
            .edges_connecting(nb, na)
            .map(|e| e.weight().weight)
            .sum();
        forward + backward
    }

    /// Symmetric adjacency lists with parallel edges merged and self loops
    /// dropped. Each list is sorted by neighbor index.
    ///
    /// Partitioners only care about how much traffic crosses a host
    /// boundary, so direction is ignored here.
    pub fn undirected_adjacency(&self) -> Vec<Vec<(usize, f64)>> {
        let mut merged: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); self.vertex_count()];
        for (s, t, data) in self.edges() {
            if s == t {
                continue;
            }
            *merged[s].entry(t).or_insert(0.0) += data.weight;
            *merged[t].entry(s).or_insert(0.0) += data.weight;
        }
        merged
            .into_iter()
            .map(|m| m.into_iter().collect())
            .collect()
    }

    /// Summary of vertex label kinds.
    pub fn vertex_label_kind(&self) -> LabelKind {
        LabelKind::of(self.vertices().map(|v| v.label.as_ref()))
    }

    /// Summary of edge label kinds.
    pub fn edge_label_kind(&self) -> LabelKind {
        LabelKind::of(self.graph.edge_weights().map(|e| e.label.as_ref()))
    }

    /// All-pairs shortest link cost, indexed by vertex index.
    ///
    /// Used on hardware graphs to price traffic between hosts. Unreachable
    /// pairs cost `f64::INFINITY`; a vertex reaches itself at cost 0.
    pub fn hop_costs(&self) -> Vec<Vec<f64>> {
        let n = self.vertex_count();
        let mut costs = vec![vec![f64::INFINITY; n]; n];

        if self.directed {
            for (i, row) in costs.iter_mut().enumerate() {
                let dist = dijkstra(&self.graph, NodeIndex::new(i), None, |e| e.weight().weight);
                for (node, d) in dist {
                    row[node.index()] = d;
                }
            }
        } else {
            let mut undirected: UnGraph<(), f64> = UnGraph::with_capacity(n, self.edge_count());
            for _ in 0..n {
                undirected.add_node(());
            }
            for (s, t, data) in self.edges() {
                undirected.add_edge(NodeIndex::new(s), NodeIndex::new(t), data.weight);
            }
            for (i, row) in costs.iter_mut().enumerate() {
                let dist = dijkstra(&undirected, NodeIndex::new(i), None, |e| *e.weight());
                for (node, d) in dist {
                    row[node.index()] = d;
                }
            }
        }

        for (i, row) in costs.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        costs
    }
}
