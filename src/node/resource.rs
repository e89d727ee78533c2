//! The abstract, not-yet-expanded resource node.

use crate::core::address::{InstanceKey, ProviderRef, ResourceAddress, Target};
use crate::core::config::ResourceConfig;
use crate::core::error::DiagnosticsError;
use crate::eval::context::EvalContext;
use crate::eval::sequence::EvalSequence;
use crate::eval::steps::ValidateCount;
use crate::graph::structure::ResourceGraph;
use crate::node::count::resolve_count;
use crate::node::instance::ResourceInstanceNode;
use crate::transform::{
    AttachStateTransformer, GraphBuilder, ReferenceTransformer, ResourceCountTransformer,
    RootTransformer, TargetsTransformer,
};
use log::debug;
use std::sync::Arc;

/// A declared resource before its count is known.
///
/// Expanding the node yields a sub-graph with one
/// [`ResourceInstanceNode`] per instance.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Address of the declaration
    pub addr: ResourceAddress,
    /// Shared configuration
    pub config: Arc<ResourceConfig>,
    /// Provider the resource's instances use
    pub resolved_provider: Option<ProviderRef>,
    /// Targets restricting the walk, empty for none
    pub targets: Vec<Target>,
    validate: bool,
}

impl ResourceNode {
    /// Create a node for a declared resource.
    pub fn new(config: Arc<ResourceConfig>) -> Self {
        Self {
            addr: config.address(),
            resolved_provider: Some(config.provider_ref()),
            config,
            targets: Vec::new(),
            validate: false,
        }
    }

    /// Restrict expansion to the given targets.
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    /// Whether the node is in validation mode.
    pub fn is_validating(&self) -> bool {
        self.validate
    }

    /// Put the node in validation mode and build its sequence.
    pub fn validation_sequence(&mut self, ctx: &EvalContext) -> EvalSequence {
        self.validate = true;
        let mut seq = EvalSequence::new(self.addr.to_string());
        seq.push(ValidateCount {
            config: Arc::clone(&self.config),
            values: Arc::clone(&ctx.values),
            validate: self.validate,
        });
        seq
    }

    /// Build the instance node for one key.
    pub fn instance_node(&self, key: InstanceKey) -> ResourceInstanceNode {
        ResourceInstanceNode {
            addr: self.addr.instance(key),
            config: Arc::clone(&self.config),
            resolved_provider: self.resolved_provider.clone(),
            targets: self.targets.clone(),
            state: None,
        }
    }

    /// Expand into a sub-graph of instances.
    ///
    /// Holds a read lock on the shared state until the sub-graph is built.
    pub fn dynamic_expand(&self, ctx: &EvalContext) -> Result<ResourceGraph, DiagnosticsError> {
        let state = ctx.state.read();

        let count = resolve_count(&self.config, &ctx.values, self.validate)
            .map_err(|e| DiagnosticsError(e.into()))?;
        debug!("{}: expanding to {} instance(s)", self.addr, count.len());

        // Targets naming other resources select this one only as a dependency
        let targets: Vec<Target> = self
            .targets
            .iter()
            .filter(|t| t.matches_resource(&self.addr))
            .cloned()
            .collect();

        let (graph, diags) = GraphBuilder::new(self.addr.to_string())
            .with_step(ResourceCountTransformer::new(count, |key| self.instance_node(key)))
            .with_step(AttachStateTransformer::new(&state))
            .with_step(TargetsTransformer::new(&targets))
            .with_step(ReferenceTransformer)
            .with_step(RootTransformer)
            .with_validate(true)
            .build();
        drop(state);

        diags.into_result()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::expr::{Expr, KnownValues, Reference};
    use crate::core::types::Value;
    use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
    use crate::state::{InstanceState, State};

    fn context() -> EvalContext {
        EvalContext::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(ProvisionerRegistry::with_builtins()),
        )
    }

    fn counted(count: Expr) -> Arc<ResourceConfig> {
        Arc::new(
            ResourceConfig::managed("aws_instance", "web")
                .with_provider(ProviderRef::new("aws").with_alias("east"))
                .with_count(count),
        )
    }

    #[test]
    fn test_count_expands_to_dense_keys() {
        let node = ResourceNode::new(counted(Expr::literal(3i64)));
        let graph = node.dynamic_expand(&context()).unwrap();

        let keys: Vec<InstanceKey> = graph.instances().map(|(_, n)| n.addr.key).collect();
        assert_eq!(keys, vec![InstanceKey::Int(0), InstanceKey::Int(1), InstanceKey::Int(2)]);
        for (_, instance) in graph.instances() {
            assert!(Arc::ptr_eq(&instance.config, &node.config));
            assert_eq!(instance.resolved_provider, node.resolved_provider);
        }
        assert_eq!(graph.vertices().filter(|(_, v)| v.is_root()).count(), 1);
    }

    #[test]
    fn test_no_count_single_instance() {
        let node = ResourceNode::new(Arc::new(ResourceConfig::managed("aws_vpc", "main")));
        let graph = node.dynamic_expand(&context()).unwrap();
        assert_eq!(graph.vertex_count(), 1);
        let (_, instance) = graph.instances().next().unwrap();
        assert_eq!(instance.addr.to_string(), "aws_vpc.main");
    }

    #[test]
    fn test_unknown_count_only_in_validation_mode() {
        let ctx = context();
        let mut node = ResourceNode::new(counted(Expr::Reference(
            Reference::parse("aws_subnet.all.count").unwrap(),
        )));

        let error = node.dynamic_expand(&ctx).unwrap_err();
        assert_eq!(error.diagnostics().errors().next().unwrap().kind, ErrorKind::InvalidCount);

        let diags = node.validation_sequence(&ctx).run();
        assert!(diags.is_empty());
        assert!(node.is_validating());
        let graph = node.dynamic_expand(&ctx).unwrap();
        assert_eq!(graph.instances().count(), 1);
    }

    #[test]
    fn test_zero_count_has_lone_root() {
        let node = ResourceNode::new(counted(Expr::literal(0i64)));
        let graph = node.dynamic_expand(&context()).unwrap();
        assert_eq!(graph.instances().count(), 0);
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn test_instance_targets_filter_siblings() {
        let node = ResourceNode::new(counted(Expr::literal(3i64))).with_targets(vec![
            "aws_instance.web[1]".parse().unwrap(),
        ]);
        let graph = node.dynamic_expand(&context()).unwrap();
        let addrs: Vec<String> = graph.instances().map(|(_, n)| n.addr.to_string()).collect();
        assert_eq!(addrs, vec!["aws_instance.web[1]"]);

        // Expanded as a dependency of something else: every instance stays
        let node = ResourceNode::new(counted(Expr::literal(3i64))).with_targets(vec![
            "aws_eip.ip".parse().unwrap(),
        ]);
        assert_eq!(node.dynamic_expand(&context()).unwrap().instances().count(), 3);
    }

    #[test]
    fn test_state_attached_and_lock_released() {
        let mut state = State::new();
        let addr = ResourceAddress::managed("aws_instance", "web");
        state.insert(addr.instance(InstanceKey::Int(0)), InstanceState::new("i-abc"));
        let ctx = context()
            .with_state(state.into_shared())
            .with_values(KnownValues::new().with_variable("n", Value::Integer(-2)));

        let node = ResourceNode::new(counted(Expr::literal(2i64)));
        let graph = node.dynamic_expand(&ctx).unwrap();
        let ids: Vec<Option<String>> = graph
            .instances()
            .map(|(_, n)| n.state.as_ref().map(|s| s.id.clone()))
            .collect();
        assert_eq!(ids, vec![Some("i-abc".to_string()), None]);
        assert!(ctx.state.try_write().is_some());

        // Failure path releases the lock too
        let bad = ResourceNode::new(counted(Expr::Reference(Reference::Variable("n".into()))));
        assert!(bad.dynamic_expand(&ctx).is_err());
        assert!(ctx.state.try_write().is_some());
    }

    #[test]
    fn test_oversized_count_fails_without_panicking() {
        let ctx = context();
        let mut node = ResourceNode::new(counted(Expr::Literal(Value::Number(1e19))));

        let diags = node.validation_sequence(&ctx).run();
        assert_eq!(diags.errors().next().unwrap().kind, ErrorKind::InvalidCount);

        let error = node.dynamic_expand(&ctx).unwrap_err();
        assert_eq!(error.diagnostics().errors().next().unwrap().kind, ErrorKind::InvalidCount);
        assert!(ctx.state.try_write().is_some());
    }

    /// Pairs of (address, attached state id) for every instance.
    fn attached(graph: &ResourceGraph) -> Vec<(String, Option<String>)> {
        graph
            .instances()
            .map(|(_, n)| (n.addr.to_string(), n.state.as_ref().map(|s| s.id.clone())))
            .collect()
    }

    #[test]
    fn test_parallel_expansions_share_read_lock() {
        let web = ResourceAddress::managed("aws_instance", "web");
        let vpc = ResourceAddress::managed("aws_vpc", "main");
        let mut state = State::new();
        state.insert(web.instance(InstanceKey::Int(0)), InstanceState::new("i-web0"));
        state.insert(vpc.instance(InstanceKey::NoKey), InstanceState::new("vpc-main"));
        let ctx = context().with_state(state.into_shared());

        let a = ResourceNode::new(counted(Expr::literal(4i64)));
        let b = ResourceNode::new(Arc::new(ResourceConfig::managed("aws_vpc", "main")));

        let guard = ctx.state.read();
        let graphs = crossbeam::scope(|scope| {
            let ha = scope.spawn(|_| a.dynamic_expand(&ctx).map(|g| attached(&g)));
            let hb = scope.spawn(|_| b.dynamic_expand(&ctx).map(|g| attached(&g)));
            (ha.join().unwrap(), hb.join().unwrap())
        })
        .unwrap();
        assert!(ctx.state.try_write().is_none());
        drop(guard);

        let web_instances = graphs.0.unwrap();
        assert_eq!(web_instances.len(), 4);
        assert_eq!(
            web_instances[0],
            ("aws_instance.web[0]".to_string(), Some("i-web0".to_string()))
        );
        assert!(web_instances[1..].iter().all(|(_, id)| id.is_none()));

        let vpc_instances = graphs.1.unwrap();
        assert_eq!(
            vpc_instances,
            vec![("aws_vpc.main".to_string(), Some("vpc-main".to_string()))]
        );
        assert!(ctx.state.try_write().is_some());
    }
}
