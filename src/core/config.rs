//! Declared resource configuration.
//!
//! A [`ResourceConfig`] is the parsed, unevaluated form of one resource
//! block. It is immutable once built and shared between a resource node and
//! every instance expanded from it.

use crate::core::address::{ProviderRef, ResourceAddress, ResourceMode};
use crate::core::expr::{Expr, Reference};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A configuration body: attributes plus nested blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    /// Attribute expressions, in declaration order
    pub attributes: IndexMap<String, Expr>,
    /// Nested blocks, in declaration order
    pub blocks: Vec<NestedBody>,
}

/// A nested block inside a body, e.g. `ebs_block_device { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedBody {
    /// Block type name
    pub type_name: String,
    /// Block contents
    pub body: Body,
}

impl Body {
    /// Create an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.attributes.insert(name.into(), expr);
        self
    }

    /// Append a nested block.
    pub fn with_block(mut self, type_name: impl Into<String>, body: Body) -> Self {
        self.blocks.push(NestedBody {
            type_name: type_name.into(),
            body,
        });
        self
    }

    /// All references in the body, nested blocks included, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self
            .attributes
            .values()
            .flat_map(|expr| expr.references())
            .collect();
        for block in &self.blocks {
            refs.extend(block.body.references());
        }
        refs
    }
}

/// When a provisioner runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerWhen {
    /// After creation
    #[default]
    Create,
    /// Before destruction
    Destroy,
}

/// What happens when a provisioner fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Fail the resource
    #[default]
    Fail,
    /// Log and carry on
    Continue,
}

/// One provisioner block declared on a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionerConfig {
    /// Provisioner type, e.g. `local-exec`
    pub type_name: String,
    /// Provisioner arguments
    pub body: Body,
    /// Optional `connection` block
    pub connection: Option<Body>,
    /// When it runs
    pub when: ProvisionerWhen,
    /// Failure behaviour
    pub on_failure: OnFailure,
}

impl ProvisionerConfig {
    /// Create a provisioner with an empty body.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            body: Body::new(),
            connection: None,
            when: ProvisionerWhen::default(),
            on_failure: OnFailure::default(),
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set the connection block.
    pub fn with_connection(mut self, connection: Body) -> Self {
        self.connection = Some(connection);
        self
    }
}

/// Configuration of one declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    /// Managed resource or data source
    pub mode: ResourceMode,
    /// Resource type
    pub type_name: String,
    /// Local name
    pub name: String,
    /// The `count` expression, if declared
    pub count: Option<Expr>,
    /// Explicit provider, when not the implied one
    pub provider: Option<ProviderRef>,
    /// Resource arguments
    pub body: Body,
    /// Provisioners, in declaration order
    pub provisioners: Vec<ProvisionerConfig>,
    /// Explicit dependencies
    pub depends_on: Vec<Reference>,
}

impl ResourceConfig {
    /// Create a managed resource configuration with an empty body.
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
            count: None,
            provider: None,
            body: Body::new(),
            provisioners: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Create a data resource configuration with an empty body.
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            ..Self::managed(type_name, name)
        }
    }

    /// Set the count expression.
    pub fn with_count(mut self, count: Expr) -> Self {
        self.count = Some(count);
        self
    }

    /// Set an explicit provider.
    pub fn with_provider(mut self, provider: ProviderRef) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Append a provisioner.
    pub fn with_provisioner(mut self, provisioner: ProvisionerConfig) -> Self {
        self.provisioners.push(provisioner);
        self
    }

    /// Append an explicit dependency.
    pub fn with_depends_on(mut self, reference: Reference) -> Self {
        self.depends_on.push(reference);
        self
    }

    /// Address of the declared resource.
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress {
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
        }
    }

    /// Provider this resource uses: the explicit one or the implied one.
    pub fn provider_ref(&self) -> ProviderRef {
        self.provider
            .clone()
            .unwrap_or_else(|| self.address().implied_provider())
    }

    /// Provisioners that apply to this resource. Data resources have none.
    pub fn managed_provisioners(&self) -> &[ProvisionerConfig] {
        match self.mode {
            ResourceMode::Managed => &self.provisioners,
            ResourceMode::Data => &[],
        }
    }

    /// References that order this resource after others: body, count,
    /// explicit dependencies and provisioner bodies.
    pub fn dependency_references(&self) -> Vec<&Reference> {
        let mut refs = self.self_check_references();
        for provisioner in self.managed_provisioners() {
            refs.extend(provisioner.body.references());
            if let Some(connection) = &provisioner.connection {
                refs.extend(connection.references());
            }
        }
        refs
    }

    /// References that must never name this resource itself: body, count
    /// and explicit dependencies.
    pub fn self_check_references(&self) -> Vec<&Reference> {
        let mut refs = self.body.references();
        if let Some(count) = &self.count {
            refs.extend(count.references());
        }
        refs.extend(self.depends_on.iter());
        refs
    }
}
