//! One expanded instance of a resource.

use crate::core::address::{ProviderRef, ResourceInstanceAddress, Target};
use crate::core::config::ResourceConfig;
use crate::eval::context::EvalContext;
use crate::eval::sequence::EvalSequence;
use crate::eval::steps::{
    GetProvider, GetProvisioner, ValidateProvisioner, ValidateResource, ValidateSelfRef,
};
use crate::state::InstanceState;
use std::sync::Arc;

/// A concrete instance produced by expanding a [`ResourceNode`](super::ResourceNode).
#[derive(Debug, Clone)]
pub struct ResourceInstanceNode {
    /// Instance address
    pub addr: ResourceInstanceAddress,
    /// Configuration shared with the declaring resource
    pub config: Arc<ResourceConfig>,
    /// Provider, copied from the declaring resource
    pub resolved_provider: Option<ProviderRef>,
    /// Targets, copied from the declaring resource
    pub targets: Vec<Target>,
    /// Recorded state, when the instance already exists
    pub state: Option<Arc<InstanceState>>,
}

impl ResourceInstanceNode {
    /// Build the validation sequence for this instance.
    ///
    /// The self-reference check runs first, then provider resolution and
    /// resource validation, then each provisioner in declaration order.
    pub fn validation_sequence(&self, ctx: &EvalContext) -> EvalSequence {
        let resource = &self.addr.resource;
        let mut seq = EvalSequence::new(self.addr.to_string());

        seq.push(ValidateSelfRef {
            addr: resource.clone(),
            config: Arc::clone(&self.config),
        });
        seq.push(GetProvider {
            addr: resource.clone(),
            provider: self.resolved_provider.clone(),
            resolver: Arc::clone(&ctx.providers),
        });
        seq.push(ValidateResource {
            addr: self.addr.clone(),
            config: Arc::clone(&self.config),
            values: Arc::clone(&ctx.values),
        });

        for (index, provisioner) in self.config.managed_provisioners().iter().enumerate() {
            seq.push(GetProvisioner {
                addr: resource.clone(),
                index,
                name: provisioner.type_name.clone(),
                resolver: Arc::clone(&ctx.provisioners),
            });
            seq.push(ValidateProvisioner {
                addr: self.addr.clone(),
                index,
                config: provisioner.clone(),
                values: Arc::clone(&ctx.values),
            });
        }

        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::{InstanceKey, ResourceAddress};
    use crate::core::config::{Body, ProvisionerConfig};
    use crate::core::error::ErrorKind;
    use crate::core::expr::{Expr, Reference};
    use crate::core::types::AttributeType;
    use crate::node::ResourceNode;
    use crate::plugin::provider::ProviderSchema;
    use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
    use crate::plugin::schema::{Attribute, Block};

    fn context(with_provider: bool) -> EvalContext {
        let mut providers = ProviderRegistry::new();
        if with_provider {
            providers.register_schema(
                "null",
                semver::Version::new(3, 0, 0),
                ProviderSchema::new().with_resource_type(
                    "null_resource",
                    Block::new()
                        .with_attribute("triggers", Attribute::optional(AttributeType::Any)),
                ),
            );
        }
        EvalContext::new(Arc::new(providers), Arc::new(ProvisionerRegistry::with_builtins()))
    }

    fn instance(config: ResourceConfig) -> ResourceInstanceNode {
        ResourceNode::new(Arc::new(config)).instance_node(InstanceKey::NoKey)
    }

    #[test]
    fn test_sequence_order() {
        let node = instance(
            ResourceConfig::managed("null_resource", "a")
                .with_provisioner(ProvisionerConfig::new("local-exec"))
                .with_provisioner(ProvisionerConfig::new("file")),
        );
        let seq = node.validation_sequence(&context(true));
        assert_eq!(
            seq.step_names(),
            vec![
                "ValidateSelfRef",
                "GetProvider",
                "ValidateResource",
                "GetProvisioner",
                "ValidateProvisioner",
                "GetProvisioner",
                "ValidateProvisioner",
            ]
        );
    }

    #[test]
    fn test_self_reference_reported_before_missing_provider() {
        let node = instance(ResourceConfig::managed("null_resource", "a").with_depends_on(
            Reference::resource(ResourceAddress::managed("null_resource", "a")),
        ));
        let diags = node.validation_sequence(&context(false)).run();

        assert_eq!(diags.len(), 1);
        assert_eq!(diags.errors().next().unwrap().kind, ErrorKind::SelfReference);
    }

    #[test]
    fn test_missing_provider_halts() {
        let node = instance(
            ResourceConfig::managed("null_resource", "a")
                .with_provisioner(ProvisionerConfig::new("nonexistent")),
        );
        let diags = node.validation_sequence(&context(false)).run();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.errors().next().unwrap().kind, ErrorKind::ProviderResolution);
    }

    #[test]
    fn test_provisioner_problems_reported_in_order() {
        let bad = |type_name: &str, attr: &str| {
            ProvisionerConfig::new(type_name)
                .with_body(Body::new().with_attribute(attr, Expr::literal("x")))
        };
        let node = instance(
            ResourceConfig::managed("null_resource", "a")
                .with_provisioner(bad("local-exec", "a_bogus"))
                .with_provisioner(bad("remote-exec", "b_bogus"))
                .with_provisioner(bad("file", "c_bogus")),
        );
        let diags = node.validation_sequence(&context(true)).run();

        let unsupported: Vec<String> = diags
            .errors()
            .filter(|d| d.summary.contains("_bogus"))
            .map(|d| d.summary.clone())
            .collect();
        assert_eq!(unsupported.len(), 3, "{:?}", diags);
        assert!(unsupported[0].contains("a_bogus"));
        assert!(unsupported[1].contains("b_bogus"));
        assert!(unsupported[2].contains("c_bogus"));
        assert!(!diags.has_fatal());
    }

    #[test]
    fn test_unknown_provisioner_halts_after_earlier_ones() {
        let node = instance(
            ResourceConfig::managed("null_resource", "a")
                .with_provisioner(ProvisionerConfig::new("local-exec"))
                .with_provisioner(ProvisionerConfig::new("chef"))
                .with_provisioner(ProvisionerConfig::new("file")),
        );
        let diags = node.validation_sequence(&context(true)).run();
        let last = diags.iter().last().unwrap();
        assert_eq!(last.kind, ErrorKind::ProvisionerResolution);
        assert!(last.summary.contains("chef"));
    }

    #[test]
    fn test_data_resources_skip_provisioners() {
        let node = instance(
            ResourceConfig::data("null_resource", "a")
                .with_provisioner(ProvisionerConfig::new("chef")),
        );
        assert_eq!(node.validation_sequence(&context(true)).len(), 3);
    }
}
