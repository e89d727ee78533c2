//! Graph export for inspection.

use crate::graph::structure::{ResourceGraph, Vertex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of an exported vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VertexKind {
    /// Unexpanded resource declaration
    Resource,
    /// Expanded instance
    Instance,
    /// Synthetic root
    Root,
}

/// Serializable representation of a vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedVertex {
    /// Position in the exported vertex list
    pub id: usize,
    /// Vertex kind
    pub kind: VertexKind,
    /// Resource or instance address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Resolved provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Whether recorded state was attached
    #[serde(default)]
    pub has_state: bool,
}

/// Serializable representation of a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEdge {
    /// The dependent vertex
    pub from: usize,
    /// The vertex it depends on
    pub to: usize,
}

/// Serializable representation of a complete graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedGraph {
    /// Export format version
    pub version: String,
    /// Graph name
    pub name: String,
    /// All vertices
    pub vertices: Vec<SerializedVertex>,
    /// All edges
    pub edges: Vec<SerializedEdge>,
}

impl SerializedGraph {
    /// Current format version.
    pub const VERSION: &'static str = "1.0.0";

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Find a vertex by address.
    pub fn find(&self, address: &str) -> Option<&SerializedVertex> {
        self.vertices
            .iter()
            .find(|v| v.address.as_deref() == Some(address))
    }
}

impl From<&ResourceGraph> for SerializedGraph {
    fn from(graph: &ResourceGraph) -> Self {
        let mut ids = HashMap::new();
        let vertices = graph
            .vertices()
            .enumerate()
            .map(|(id, (index, vertex))| {
                ids.insert(index, id);
                let (kind, address, provider, has_state) = match vertex {
                    Vertex::Resource(node) => (
                        VertexKind::Resource,
                        Some(node.addr.to_string()),
                        node.resolved_provider.as_ref().map(|p| p.to_string()),
                        false,
                    ),
                    Vertex::Instance(node) => (
                        VertexKind::Instance,
                        Some(node.addr.to_string()),
                        node.resolved_provider.as_ref().map(|p| p.to_string()),
                        node.state.is_some(),
                    ),
                    Vertex::Root => (VertexKind::Root, None, None, false),
                };
                SerializedVertex {
                    id,
                    kind,
                    address,
                    provider,
                    has_state,
                }
            })
            .collect();

        let edges = graph
            .edges()
            .filter_map(|(from, to)| {
                Some(SerializedEdge {
                    from: *ids.get(&from)?,
                    to: *ids.get(&to)?,
                })
            })
            .collect();

        Self {
            version: Self::VERSION.to_string(),
            name: graph.name().to_string(),
            vertices,
            edges,
        }
    }
}
