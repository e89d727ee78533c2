//! The individual transformers used to build declaration and instance graphs.

use crate::core::address::{InstanceKey, ResourceAddress, Target};
use crate::core::config::ResourceConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::error::EvalError;
use crate::core::expr::Reference;
use crate::graph::structure::{ResourceGraph, Vertex};
use crate::graph::topology::TopologyAnalyzer;
use crate::node::count::ExpandCount;
use crate::node::{ResourceInstanceNode, ResourceNode};
use crate::state::State;
use crate::transform::GraphTransformer;
use indexmap::IndexMap;
use log::{debug, trace};
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;
use std::sync::Arc;

fn graph_error(stage: &str, error: impl std::fmt::Display) -> Diagnostics {
    EvalError::graph_build(stage, error).into()
}

// ============================================================================
// Declaration graph
// ============================================================================

/// Adds one resource vertex per declared resource.
pub struct ConfigTransformer<'a> {
    configs: &'a [Arc<ResourceConfig>],
    targets: &'a [Target],
}

impl<'a> ConfigTransformer<'a> {
    /// Create a transformer over the declared resources.
    pub fn new(configs: &'a [Arc<ResourceConfig>], targets: &'a [Target]) -> Self {
        Self { configs, targets }
    }
}

impl GraphTransformer for ConfigTransformer<'_> {
    fn name(&self) -> &str {
        "ConfigTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        let mut seen: HashSet<ResourceAddress> = HashSet::new();
        let mut diags = Diagnostics::new();

        for config in self.configs {
            let addr = config.address();
            if !seen.insert(addr.clone()) {
                diags.push(EvalError::graph_build(
                    self.name(),
                    format!("resource {} is declared more than once", addr),
                ));
                continue;
            }
            let node = ResourceNode::new(Arc::clone(config)).with_targets(self.targets.to_vec());
            graph.add_vertex(Vertex::Resource(node));
        }

        if diags.has_errors() {
            return Err(diags);
        }
        Ok(())
    }
}

// ============================================================================
// Instance graph
// ============================================================================

/// Builds an instance node for a key.
pub type InstanceFactory<'a> = Box<dyn Fn(InstanceKey) -> ResourceInstanceNode + 'a>;

/// Adds one instance vertex per key of an expanded count.
pub struct ResourceCountTransformer<'a> {
    count: ExpandCount,
    factory: InstanceFactory<'a>,
}

impl<'a> ResourceCountTransformer<'a> {
    /// Create a transformer producing `count` instances through `factory`.
    pub fn new(
        count: ExpandCount,
        factory: impl Fn(InstanceKey) -> ResourceInstanceNode + 'a,
    ) -> Self {
        Self {
            count,
            factory: Box::new(factory),
        }
    }
}

impl GraphTransformer for ResourceCountTransformer<'_> {
    fn name(&self) -> &str {
        "ResourceCountTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        for key in self.count.keys() {
            let node = (self.factory)(key);
            trace!("adding instance {}", node.addr);
            graph.add_vertex(Vertex::Instance(node));
        }
        Ok(())
    }
}

/// Attaches recorded state to instances that have any.
pub struct AttachStateTransformer<'a> {
    state: &'a State,
}

impl<'a> AttachStateTransformer<'a> {
    /// Attach from the given state.
    pub fn new(state: &'a State) -> Self {
        Self { state }
    }
}

impl GraphTransformer for AttachStateTransformer<'_> {
    fn name(&self) -> &str {
        "AttachStateTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        for index in graph.indices() {
            if let Ok(Vertex::Instance(node)) = graph.vertex_mut(index) {
                node.state = self.state.get(&node.addr);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Shared transformers
// ============================================================================

/// Keeps only targeted vertices and what they depend on.
pub struct TargetsTransformer<'a> {
    targets: &'a [Target],
}

impl<'a> TargetsTransformer<'a> {
    /// Filter by the given targets. No targets keeps everything.
    pub fn new(targets: &'a [Target]) -> Self {
        Self { targets }
    }
}

impl GraphTransformer for TargetsTransformer<'_> {
    fn name(&self) -> &str {
        "TargetsTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        if self.targets.is_empty() {
            return Ok(());
        }

        let targeted: Vec<NodeIndex> = graph
            .vertices()
            .filter(|(_, v)| v.is_targeted(self.targets))
            .map(|(i, _)| i)
            .collect();
        let keep = TopologyAnalyzer::new(graph).transitive_dependencies(&targeted);

        let mut removed = 0;
        for index in graph.indices() {
            if !keep.contains(&index) {
                graph
                    .remove_vertex(index)
                    .map_err(|e| graph_error(self.name(), e))?;
                removed += 1;
            }
        }
        debug!("targeting removed {} vertices, kept {}", removed, keep.len());
        Ok(())
    }
}

/// Orders vertices after the resources their configuration refers to.
pub struct ReferenceTransformer;

impl GraphTransformer for ReferenceTransformer {
    fn name(&self) -> &str {
        "ReferenceTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        let mut by_address: IndexMap<ResourceAddress, Vec<(NodeIndex, Option<InstanceKey>)>> =
            IndexMap::new();
        for (index, vertex) in graph.vertices() {
            if let Some(addr) = vertex.resource_address() {
                by_address
                    .entry(addr.clone())
                    .or_default()
                    .push((index, vertex.instance_key()));
            }
        }

        let mut edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();
        for (from, vertex) in graph.vertices() {
            let (Some(own), Some(config)) = (vertex.resource_address(), vertex.config()) else {
                continue;
            };
            for reference in config.dependency_references() {
                let Reference::Resource { resource, key, .. } = reference else {
                    continue;
                };
                if resource == own {
                    continue;
                }
                let Some(candidates) = by_address.get(resource) else {
                    continue;
                };
                for &(to, candidate_key) in candidates {
                    // An indexed reference only orders against the matching instance
                    let matches = match (key, candidate_key) {
                        (Some(wanted), Some(found)) => *wanted == found,
                        _ => true,
                    };
                    if matches {
                        edges.push((from, to));
                    }
                }
            }
        }

        for (from, to) in edges {
            graph
                .add_edge(from, to)
                .map_err(|e| graph_error(self.name(), e))?;
        }
        Ok(())
    }
}

/// Gives the graph a single entry point.
pub struct RootTransformer;

impl GraphTransformer for RootTransformer {
    fn name(&self) -> &str {
        "RootTransformer"
    }

    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics> {
        let roots = graph.roots();
        if roots.len() == 1 {
            return Ok(());
        }

        let root = graph.add_vertex(Vertex::Root);
        for index in roots {
            graph
                .add_edge(root, index)
                .map_err(|e| graph_error(self.name(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Body;
    use crate::core::expr::Expr;
    use crate::state::InstanceState;
    use crate::transform::GraphBuilder;

    fn resource(type_name: &str, name: &str, refs: &[&str]) -> Arc<ResourceConfig> {
        let mut body = Body::new();
        for (i, r) in refs.iter().enumerate() {
            let expr = Expr::Reference(Reference::parse(r).unwrap());
            body = body.with_attribute(format!("a{}", i), expr);
        }
        Arc::new(ResourceConfig::managed(type_name, name).with_body(body))
    }

    fn declaration(configs: &[Arc<ResourceConfig>], targets: &[Target]) -> ResourceGraph {
        let (graph, diags) = GraphBuilder::new("declaration")
            .with_step(ConfigTransformer::new(configs, &[]))
            .with_step(ReferenceTransformer)
            .with_step(TargetsTransformer::new(targets))
            .with_step(RootTransformer)
            .with_validate(true)
            .build();
        assert!(diags.is_empty(), "{:?}", diags);
        graph
    }

    fn addresses(graph: &ResourceGraph) -> Vec<String> {
        let mut out: Vec<String> = graph.vertices().map(|(_, v)| v.to_string()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_duplicate_declaration() {
        let configs = vec![resource("aws_vpc", "main", &[]), resource("aws_vpc", "main", &[])];
        let (_, diags) = GraphBuilder::new("d")
            .with_step(ConfigTransformer::new(&configs, &[]))
            .build();
        assert!(diags.errors().next().unwrap().summary.contains("more than once"));
    }

    #[test]
    fn test_references_become_edges() {
        let configs = vec![
            resource("aws_vpc", "main", &[]),
            resource("aws_subnet", "a", &["aws_vpc.main.id"]),
            resource(
                "aws_instance",
                "web",
                &["aws_subnet.a.id", "aws_instance.web.id", "aws_eip.none.id"],
            ),
        ];
        let graph = declaration(&configs, &[]);

        // Single dependent chain: no synthetic root needed
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.roots().len(), 1);
    }

    #[test]
    fn test_root_added_only_when_needed() {
        let configs = vec![resource("aws_vpc", "a", &[]), resource("aws_vpc", "b", &[])];
        let graph = declaration(&configs, &[]);
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.vertices().filter(|(_, v)| v.is_root()).count(), 1);

        let (graph, _) = GraphBuilder::new("empty").with_step(RootTransformer).build();
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn test_targeting_keeps_transitive_dependencies() {
        let configs = vec![
            resource("aws_vpc", "main", &[]),
            resource("aws_subnet", "a", &["aws_vpc.main.id"]),
            resource("aws_instance", "web", &["aws_subnet.a.id"]),
            resource("aws_instance", "unrelated", &["aws_vpc.main.id"]),
        ];
        let targets = vec![Target::Resource(ResourceAddress::managed("aws_instance", "web"))];
        let graph = declaration(&configs, &targets);

        assert_eq!(
            addresses(&graph),
            vec!["aws_instance.web (expand)", "aws_subnet.a (expand)", "aws_vpc.main (expand)"]
        );
    }

    #[test]
    fn test_cycle_reported() {
        let configs = vec![
            resource("aws_vpc", "a", &["aws_vpc.b.id"]),
            resource("aws_vpc", "b", &["aws_vpc.a.id"]),
        ];
        let (_, diags) = GraphBuilder::new("d")
            .with_step(ConfigTransformer::new(&configs, &[]))
            .with_step(ReferenceTransformer)
            .with_step(RootTransformer)
            .with_validate(true)
            .build();
        assert!(diags.errors().next().unwrap().summary.contains("Cycle"));
    }

    #[test]
    fn test_instances_with_state() {
        let config = resource("aws_instance", "web", &[]);
        let node = ResourceNode::new(Arc::clone(&config));
        let mut state = State::new();
        state.insert(node.addr.instance(InstanceKey::Int(1)), InstanceState::new("i-123"));

        let (graph, diags) = GraphBuilder::new("expand")
            .with_step(ResourceCountTransformer::new(ExpandCount::Counted(3), |key| {
                node.instance_node(key)
            }))
            .with_step(AttachStateTransformer::new(&state))
            .with_step(TargetsTransformer::new(&[]))
            .with_step(ReferenceTransformer)
            .with_step(RootTransformer)
            .with_validate(true)
            .build();
        assert!(diags.is_empty());
        assert_eq!(graph.instances().count(), 3);
        assert_eq!(graph.vertex_count(), 4);

        let with_state: Vec<String> = graph
            .instances()
            .filter(|(_, n)| n.state.is_some())
            .map(|(_, n)| n.addr.to_string())
            .collect();
        assert_eq!(with_state, vec!["aws_instance.web[1]"]);
    }
}
