//! The individual steps that make up node validation sequences.

use crate::core::address::{ProviderRef, ResourceAddress, ResourceInstanceAddress};
use crate::core::config::{ProvisionerConfig, ResourceConfig};
use crate::core::error::{EvalError, ResolutionError};
use crate::core::expr::{EvalScope, KnownValues};
use crate::eval::sequence::{EvalStep, SequenceState, StepOutput, StepResult};
use crate::node::count::resolve_count;
use crate::plugin::provider::{ProviderResolver, ProvisionerResolver};
use crate::plugin::schema::{body_value, connection_schema};
use log::{debug, trace};
use std::sync::Arc;

// ============================================================================
// Resource steps
// ============================================================================

/// Check that a resource's count can be resolved.
pub struct ValidateCount {
    /// Configuration whose count is checked
    pub config: Arc<ResourceConfig>,
    /// Values available for evaluation
    pub values: Arc<KnownValues>,
    /// Whether an unknown count is acceptable
    pub validate: bool,
}

impl EvalStep for ValidateCount {
    fn name(&self) -> &'static str {
        "ValidateCount"
    }

    fn eval(&self, _state: &SequenceState) -> StepResult {
        match resolve_count(&self.config, &self.values, self.validate) {
            Ok(count) => {
                trace!("{}: count resolves to {}", self.config.address(), count.len());
                StepResult::ok()
            }
            Err(error) => StepResult::error(error),
        }
    }
}

// ============================================================================
// Instance steps
// ============================================================================

/// Reject a resource whose body, count or explicit dependencies refer to the
/// resource itself.
pub struct ValidateSelfRef {
    /// The resource being checked
    pub addr: ResourceAddress,
    /// Its configuration
    pub config: Arc<ResourceConfig>,
}

impl EvalStep for ValidateSelfRef {
    fn name(&self) -> &'static str {
        "ValidateSelfRef"
    }

    fn eval(&self, _state: &SequenceState) -> StepResult {
        let found = self
            .config
            .self_check_references()
            .into_iter()
            .find(|r| r.resource_addr() == Some(&self.addr));

        match found {
            Some(reference) => StepResult::error(EvalError::SelfReference {
                address: self.addr.clone(),
                reference: reference.to_string(),
            }),
            None => StepResult::ok(),
        }
    }
}

/// Resolve the provider an instance uses.
pub struct GetProvider {
    /// The resource the provider is needed for
    pub addr: ResourceAddress,
    /// The resolved provider reference, if any
    pub provider: Option<ProviderRef>,
    /// Where providers come from
    pub resolver: Arc<dyn ProviderResolver>,
}

impl EvalStep for GetProvider {
    fn name(&self) -> &'static str {
        "GetProvider"
    }

    fn eval(&self, _state: &SequenceState) -> StepResult {
        let Some(provider) = &self.provider else {
            return StepResult::error(EvalError::ProviderResolution {
                address: self.addr.clone(),
                provider: "<none>".to_string(),
                source: ResolutionError::Unresolved,
            });
        };

        match self.resolver.resolve_provider(provider) {
            Ok(resolved) => StepResult::output(StepOutput::Provider(resolved)),
            Err(error) => {
                debug!("{}: {} unavailable: {}", self.addr, provider, error);
                StepResult::error(error.for_provider(&self.addr, provider))
            }
        }
    }
}

/// Validate an instance's body against its provider's schema.
pub struct ValidateResource {
    /// The instance being validated
    pub addr: ResourceInstanceAddress,
    /// Its configuration
    pub config: Arc<ResourceConfig>,
    /// Values available for evaluation
    pub values: Arc<KnownValues>,
}

impl EvalStep for ValidateResource {
    fn name(&self) -> &'static str {
        "ValidateResource"
    }

    fn eval(&self, state: &SequenceState) -> StepResult {
        let Some(resolved) = state.provider() else {
            return StepResult::error(EvalError::graph_build(
                self.name(),
                format!("{}: provider was not resolved before validation", self.addr),
            ));
        };

        let subject = self.addr.to_string();
        let Some(block) = resolved
            .schema
            .schema_for(self.config.mode, &self.config.type_name)
        else {
            return StepResult::error(EvalError::SchemaValidation {
                subject,
                path: "type".to_string(),
                reason: format!(
                    "provider {} does not support resource type \"{}\"",
                    resolved.provider.name(),
                    self.config.type_name
                ),
            });
        };

        let scope = EvalScope {
            key: Some(self.addr.key),
        };
        let mut diags = block.validate(&self.config.body, &self.values, scope, &subject);
        let value = body_value(&self.config.body, &self.values, scope);
        diags.extend(
            resolved
                .provider
                .validate_resource(self.config.mode, &self.config.type_name, &value)
                .with_default_address(&subject),
        );
        StepResult::diagnostics(diags)
    }
}

// ============================================================================
// Provisioner steps
// ============================================================================

/// Resolve the provisioner declared at `index`.
pub struct GetProvisioner {
    /// The resource declaring the provisioner
    pub addr: ResourceAddress,
    /// Declaration index
    pub index: usize,
    /// Provisioner type name
    pub name: String,
    /// Where provisioners come from
    pub resolver: Arc<dyn ProvisionerResolver>,
}

impl EvalStep for GetProvisioner {
    fn name(&self) -> &'static str {
        "GetProvisioner"
    }

    fn eval(&self, _state: &SequenceState) -> StepResult {
        match self.resolver.resolve_provisioner(&self.name) {
            Ok(resolved) => StepResult::output(StepOutput::Provisioner {
                index: self.index,
                resolved,
            }),
            Err(source) => StepResult::error(EvalError::ProvisionerResolution {
                address: self.addr.clone(),
                provisioner: self.name.clone(),
                source,
            }),
        }
    }
}

/// Validate the body and connection of the provisioner declared at `index`.
pub struct ValidateProvisioner {
    /// The instance the provisioner belongs to
    pub addr: ResourceInstanceAddress,
    /// Declaration index
    pub index: usize,
    /// The provisioner block
    pub config: ProvisionerConfig,
    /// Values available for evaluation
    pub values: Arc<KnownValues>,
}

impl EvalStep for ValidateProvisioner {
    fn name(&self) -> &'static str {
        "ValidateProvisioner"
    }

    fn eval(&self, state: &SequenceState) -> StepResult {
        let Some(resolved) = state.provisioner(self.index) else {
            return StepResult::error(EvalError::graph_build(
                self.name(),
                format!(
                    "{}: provisioner {} was not resolved before validation",
                    self.addr, self.index
                ),
            ));
        };

        let scope = EvalScope {
            key: Some(self.addr.key),
        };
        let subject = format!("{} provisioner \"{}\"", self.addr, self.config.type_name);
        let mut diags = resolved
            .schema
            .validate(&self.config.body, &self.values, scope, &subject);

        if let Some(connection) = &self.config.connection {
            let subject = format!("{} connection", subject);
            diags.extend(connection_schema().validate(connection, &self.values, scope, &subject));
        }

        let value = body_value(&self.config.body, &self.values, scope);
        let own = resolved.provisioner.validate_config(&value);
        diags.extend(own.with_default_address(&subject));
        StepResult::diagnostics(diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::InstanceKey;
    use crate::core::error::ErrorKind;
    use crate::core::config::Body;
    use crate::core::expr::{Expr, Reference};
    use crate::core::types::{AttributeType, Value};
    use crate::eval::sequence::EvalSequence;
    use crate::plugin::provider::ProviderSchema;
    use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
    use crate::plugin::schema::{Attribute, Block};

    fn registry() -> Arc<ProviderRegistry> {
        let schema = ProviderSchema::new().with_resource_type(
            "null_resource",
            Block::new()
                .with_attribute(
                    "triggers",
                    Attribute::optional(AttributeType::Map(Box::new(AttributeType::String))),
                )
                .with_attribute("id", Attribute::computed(AttributeType::String)),
        );
        let mut registry = ProviderRegistry::new();
        registry.register_schema("null", semver::Version::new(3, 2, 1), schema);
        Arc::new(registry)
    }

    fn instance(config: ResourceConfig) -> (ResourceInstanceAddress, Arc<ResourceConfig>) {
        (config.address().instance(InstanceKey::NoKey), Arc::new(config))
    }

    #[test]
    fn test_self_reference_detected() {
        let own_id = Expr::Reference(Reference::parse("null_resource.a.id").unwrap());
        let config = ResourceConfig::managed("null_resource", "a")
            .with_body(Body::new().with_attribute("x", own_id));
        let step = ValidateSelfRef {
            addr: config.address(),
            config: Arc::new(config),
        };
        let result = step.eval(&SequenceState::default());
        let diag = result.diagnostics.errors().next().unwrap();
        assert_eq!(diag.kind, ErrorKind::SelfReference);
        assert!(diag.summary.contains("null_resource.a.id"));
    }

    #[test]
    fn test_provisioner_reference_to_self_is_allowed() {
        use crate::core::config::ProvisionerConfig;
        let own_id = Expr::Reference(Reference::parse("null_resource.a.id").unwrap());
        let config = ResourceConfig::managed("null_resource", "a").with_provisioner(
            ProvisionerConfig::new("local-exec")
                .with_body(Body::new().with_attribute("command", own_id)),
        );
        let step = ValidateSelfRef {
            addr: config.address(),
            config: Arc::new(config),
        };
        assert!(step.eval(&SequenceState::default()).diagnostics.is_empty());
    }

    #[test]
    fn test_missing_provider_reference() {
        let step = GetProvider {
            addr: ResourceAddress::managed("null_resource", "a"),
            provider: None,
            resolver: registry(),
        };
        let result = step.eval(&SequenceState::default());
        assert!(result.outputs.is_empty());
        assert!(result.diagnostics.has_fatal());
    }

    #[test]
    fn test_resource_validated_against_schema() {
        let (addr, config) = instance(ResourceConfig::managed("null_resource", "a").with_body(
            Body::new()
                .with_attribute("triggers", Expr::literal("not a map"))
                .with_attribute("id", Expr::literal("x"))
                .with_attribute("bogus", Expr::literal(1i64)),
        ));

        let mut seq = EvalSequence::new(addr.to_string());
        seq.push(GetProvider {
            addr: addr.resource.clone(),
            provider: Some(config.provider_ref()),
            resolver: registry(),
        });
        seq.push(ValidateResource {
            addr,
            config,
            values: Arc::new(KnownValues::new()),
        });

        let diags = seq.run();
        assert_eq!(diags.errors().count(), 3);
        assert!(!diags.has_fatal());
    }

    #[test]
    fn test_unknown_resource_type() {
        let (addr, config) = instance(
            ResourceConfig::managed("null_thing", "a").with_provider(ProviderRef::new("null")),
        );
        let mut seq = EvalSequence::new(addr.to_string());
        seq.push(GetProvider {
            addr: addr.resource.clone(),
            provider: Some(config.provider_ref()),
            resolver: registry(),
        });
        seq.push(ValidateResource {
            addr,
            config,
            values: Arc::new(KnownValues::new()),
        });

        let diags = seq.run();
        let diag = diags.errors().next().unwrap();
        assert_eq!(diag.kind, ErrorKind::SchemaValidation);
        assert!(diag.summary.contains("null_thing"));
    }

    #[test]
    fn test_provisioner_body_and_connection_validated() {
        let (addr, _) = instance(ResourceConfig::managed("null_resource", "a"));
        let provisioner = ProvisionerConfig::new("local-exec")
            .with_body(Body::new().with_attribute("commnd", Expr::literal("echo")))
            .with_connection(
                Body::new().with_attribute("port", Expr::literal(Value::from("twenty-two"))),
            );

        let mut seq = EvalSequence::new(addr.to_string());
        seq.push(GetProvisioner {
            addr: addr.resource.clone(),
            index: 0,
            name: provisioner.type_name.clone(),
            resolver: Arc::new(ProvisionerRegistry::with_builtins()),
        });
        seq.push(ValidateProvisioner {
            addr,
            index: 0,
            config: provisioner,
            values: Arc::new(KnownValues::new()),
        });

        let diags = seq.run();
        let summaries: Vec<&str> = diags.errors().map(|d| d.summary.as_str()).collect();
        assert!(summaries.iter().any(|s| s.contains("commnd")), "{:?}", summaries);
        assert!(summaries.iter().any(|s| s.contains("command")), "{:?}", summaries);
        assert!(summaries.iter().any(|s| s.contains("port")), "{:?}", summaries);
        assert!(diags.iter().all(|d| d.address.as_deref().unwrap().starts_with("null_resource.a")));
    }

    #[test]
    fn test_unknown_provisioner_is_fatal() {
        let step = GetProvisioner {
            addr: ResourceAddress::managed("null_resource", "a"),
            index: 0,
            name: "chef".to_string(),
            resolver: Arc::new(ProvisionerRegistry::with_builtins()),
        };
        let result = step.eval(&SequenceState::default());
        assert_eq!(
            result.diagnostics.errors().next().unwrap().kind,
            ErrorKind::ProvisionerResolution
        );
    }
}
