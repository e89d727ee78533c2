//! Graph structure and vertex management.
//!
//! A [`ResourceGraph`] holds resource declarations, expanded instances and
//! at most one synthetic root. Edges point from a vertex to the vertices it
//! depends on, so a vertex's outgoing neighbours must be walked first.

use crate::core::address::{InstanceKey, ResourceAddress, Target};
use crate::core::config::ResourceConfig;
use crate::core::error::{GraphError, GraphResult};
use crate::node::{ResourceInstanceNode, ResourceNode};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::fmt;

/// A vertex in a resource graph.
#[derive(Debug, Clone)]
pub enum Vertex {
    /// An abstract resource declaration, not yet expanded
    Resource(ResourceNode),
    /// One expanded instance
    Instance(ResourceInstanceNode),
    /// Synthetic single entry point
    Root,
}

impl Vertex {
    /// Address of the resource this vertex belongs to.
    pub fn resource_address(&self) -> Option<&ResourceAddress> {
        match self {
            Vertex::Resource(node) => Some(&node.addr),
            Vertex::Instance(node) => Some(&node.addr.resource),
            Vertex::Root => None,
        }
    }

    /// Instance key, for instance vertices.
    pub fn instance_key(&self) -> Option<InstanceKey> {
        match self {
            Vertex::Instance(node) => Some(node.addr.key),
            _ => None,
        }
    }

    /// Configuration the vertex was built from.
    pub fn config(&self) -> Option<&ResourceConfig> {
        match self {
            Vertex::Resource(node) => Some(&node.config),
            Vertex::Instance(node) => Some(&node.config),
            Vertex::Root => None,
        }
    }

    /// Whether any of the targets selects this vertex.
    pub fn is_targeted(&self, targets: &[Target]) -> bool {
        match self {
            Vertex::Resource(node) => targets.iter().any(|t| t.matches_resource(&node.addr)),
            Vertex::Instance(node) => targets.iter().any(|t| t.matches_instance(&node.addr)),
            Vertex::Root => false,
        }
    }

    /// Whether this is the synthetic root.
    pub fn is_root(&self) -> bool {
        matches!(self, Vertex::Root)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Resource(node) => write!(f, "{} (expand)", node.addr),
            Vertex::Instance(node) => write!(f, "{}", node.addr),
            Vertex::Root => write!(f, "root"),
        }
    }
}

/// A directed dependency graph of resources and instances.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: StableDiGraph<Vertex, ()>,
    name: String,
}

impl ResourceGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name used in logs and exports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Vertex Management
    // ========================================================================

    /// Add a vertex and return its index.
    pub fn add_vertex(&mut self, vertex: Vertex) -> NodeIndex {
        self.graph.add_node(vertex)
    }

    /// Remove a vertex together with all its edges.
    pub fn remove_vertex(&mut self, index: NodeIndex) -> GraphResult<Vertex> {
        self.graph
            .remove_node(index)
            .ok_or(GraphError::VertexNotFound(index))
    }

    /// Get a vertex by index.
    pub fn vertex(&self, index: NodeIndex) -> GraphResult<&Vertex> {
        self.graph
            .node_weight(index)
            .ok_or(GraphError::VertexNotFound(index))
    }

    /// Get a mutable vertex by index.
    pub fn vertex_mut(&mut self, index: NodeIndex) -> GraphResult<&mut Vertex> {
        self.graph
            .node_weight_mut(index)
            .ok_or(GraphError::VertexNotFound(index))
    }

    /// Check if a vertex exists.
    pub fn contains(&self, index: NodeIndex) -> bool {
        self.graph.contains_node(index)
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = (NodeIndex, &Vertex)> {
        self.graph.node_indices().map(move |i| (i, &self.graph[i]))
    }

    /// All vertex indices in insertion order.
    pub fn indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Expanded instances in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = (NodeIndex, &ResourceInstanceNode)> {
        self.vertices().filter_map(|(i, v)| match v {
            Vertex::Instance(node) => Some((i, node)),
            _ => None,
        })
    }

    /// Resource declarations in insertion order.
    pub fn resources(&self) -> impl Iterator<Item = (NodeIndex, &ResourceNode)> {
        self.vertices().filter_map(|(i, v)| match v {
            Vertex::Resource(node) => Some((i, node)),
            _ => None,
        })
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    // ========================================================================
    // Edge Management
    // ========================================================================

    /// Record that `from` depends on `to`.
    ///
    /// Adding an edge that already exists is a no-op.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) -> GraphResult<()> {
        if !self.contains(from) {
            return Err(GraphError::VertexNotFound(from));
        }
        if !self.contains(to) {
            return Err(GraphError::VertexNotFound(to));
        }
        if from == to {
            return Err(GraphError::SelfLoop(self.graph[from].to_string()));
        }
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    /// Whether `from` directly depends on `to`.
    pub fn has_edge(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }

    /// All edges as `(dependent, dependency)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.graph.edge_references().map(|e| (e.source(), e.target()))
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertices that `index` depends on.
    pub fn dependencies(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Outgoing)
    }

    /// Vertices that depend on `index`.
    pub fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Vertices nothing depends on.
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&i| self.dependents(i).next().is_none())
            .collect()
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check whether the graph contains a cycle.
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Check that the graph is walkable: no self-loops, no cycles and
    /// exactly one root.
    pub fn validate(&self) -> GraphResult<()> {
        if let Some(edge) = self
            .graph
            .edge_references()
            .find(|e| e.source() == e.target())
        {
            return Err(GraphError::SelfLoop(self.graph[edge.source()].to_string()));
        }

        if let Some(cycle) = tarjan_scc(&self.graph).into_iter().find(|scc| scc.len() > 1) {
            let mut nodes: Vec<String> = cycle.iter().map(|&i| self.graph[i].to_string()).collect();
            nodes.sort();
            return Err(GraphError::CycleDetected { nodes });
        }

        let roots = self.roots();
        if roots.len() != 1 {
            return Err(GraphError::InvalidRoot(roots.len()));
        }
        Ok(())
    }

    /// Borrow the underlying petgraph structure.
    pub fn inner(&self) -> &StableDiGraph<Vertex, ()> {
        &self.graph
    }
}
