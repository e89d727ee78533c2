//! Topological analysis of resource graphs.
//!
//! Provides algorithms for:
//! - Walk order (dependencies before dependents)
//! - Parallel batch identification
//! - Transitive dependency closure

use crate::core::error::{GraphError, GraphResult};
use crate::graph::structure::ResourceGraph;
use petgraph::algo::toposort;
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a ResourceGraph,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a ResourceGraph) -> Self {
        Self { graph }
    }

    /// Get the walk order.
    ///
    /// Every vertex appears after all the vertices it depends on.
    pub fn walk_order(&self) -> GraphResult<Vec<NodeIndex>> {
        let mut order = toposort(self.graph.inner(), None).map_err(|cycle| {
            let name = self
                .graph
                .vertex(cycle.node_id())
                .map(|v| v.to_string())
                .unwrap_or_default();
            GraphError::CycleDetected { nodes: vec![name] }
        })?;
        // Edges point at dependencies, so the sort yields dependents first
        order.reverse();
        Ok(order)
    }

    /// Group vertices into batches that can be walked in parallel.
    ///
    /// A vertex's batch is one past the deepest batch among its
    /// dependencies; vertices with no dependencies are in batch 0. Within a
    /// batch, vertices keep their walk order.
    pub fn parallel_batches(&self) -> GraphResult<Vec<Vec<NodeIndex>>> {
        let order = self.walk_order()?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        let mut batches: Vec<Vec<NodeIndex>> = Vec::new();

        for index in order {
            let d = self
                .graph
                .dependencies(index)
                .filter_map(|dep| depth.get(&dep))
                .max()
                .map_or(0, |deepest| deepest + 1);
            depth.insert(index, d);

            if batches.len() <= d {
                batches.resize_with(d + 1, Vec::new);
            }
            batches[d].push(index);
        }

        Ok(batches)
    }

    /// Every vertex reachable from `start` along dependency edges,
    /// including the start vertices themselves.
    pub fn transitive_dependencies(&self, start: &[NodeIndex]) -> HashSet<NodeIndex> {
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> = start.to_vec();

        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.graph.dependencies(current));
            }
        }

        seen
    }

    /// Vertices whose dependencies have all been walked.
    pub fn ready_to_walk(&self, walked: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
        self.graph
            .indices()
            .into_iter()
            .filter(|index| {
                !walked.contains(index)
                    && self.graph.dependencies(*index).all(|dep| walked.contains(&dep))
            })
            .collect()
    }

    /// Length of the longest dependency chain.
    pub fn critical_path_length(&self) -> GraphResult<usize> {
        Ok(self.parallel_batches()?.len())
    }
}
