//! Provider and provisioner plugin interfaces.

use crate::core::address::{ProviderRef, ResourceMode};
use crate::core::diagnostics::Diagnostics;
use crate::core::error::ResolutionError;
use crate::core::types::Value;
use crate::plugin::schema::Block;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Everything a provider declares about its configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSchema {
    /// Schema of the provider's own configuration block
    #[serde(default)]
    pub provider: Block,
    /// Managed resource types
    #[serde(default)]
    pub resource_types: IndexMap<String, Block>,
    /// Data source types
    #[serde(default)]
    pub data_sources: IndexMap<String, Block>,
}

impl ProviderSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a managed resource type.
    pub fn with_resource_type(mut self, name: impl Into<String>, block: Block) -> Self {
        self.resource_types.insert(name.into(), block);
        self
    }

    /// Add a data source type.
    pub fn with_data_source(mut self, name: impl Into<String>, block: Block) -> Self {
        self.data_sources.insert(name.into(), block);
        self
    }

    /// Schema for a resource type in the given mode.
    pub fn schema_for(&self, mode: ResourceMode, type_name: &str) -> Option<&Block> {
        match mode {
            ResourceMode::Managed => self.resource_types.get(type_name),
            ResourceMode::Data => self.data_sources.get(type_name),
        }
    }
}

/// A plugin that implements resource types.
pub trait ResourceProvider: Send + Sync {
    /// Provider type name, e.g. `aws`.
    fn name(&self) -> &str;

    /// Fetch the provider's schema.
    fn schema(&self) -> Result<ProviderSchema, ResolutionError>;

    /// Provider-specific validation of an evaluated resource body.
    ///
    /// Runs after schema validation; the default accepts everything.
    fn validate_resource(
        &self,
        _mode: ResourceMode,
        _type_name: &str,
        _config: &Value,
    ) -> Diagnostics {
        Diagnostics::new()
    }
}

/// A plugin that runs actions against a created resource.
pub trait ResourceProvisioner: Send + Sync {
    /// Provisioner type name, e.g. `local-exec`.
    fn name(&self) -> &str;

    /// Fetch the schema of the provisioner's body.
    fn schema(&self) -> Result<Block, ResolutionError>;

    /// Provisioner-specific validation of an evaluated body.
    fn validate_config(&self, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }
}

/// A provider handle together with its schema.
#[derive(Clone)]
pub struct ResolvedProvider {
    /// The provider
    pub provider: Arc<dyn ResourceProvider>,
    /// Its schema
    pub schema: Arc<ProviderSchema>,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("resource_types", &self.schema.resource_types.len())
            .finish()
    }
}

/// A provisioner handle together with its schema.
#[derive(Clone)]
pub struct ResolvedProvisioner {
    /// The provisioner
    pub provisioner: Arc<dyn ResourceProvisioner>,
    /// Its schema
    pub schema: Arc<Block>,
}

impl fmt::Debug for ResolvedProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvisioner")
            .field("provisioner", &self.provisioner.name())
            .finish()
    }
}

/// Resolves provider references to live providers.
pub trait ProviderResolver: Send + Sync {
    /// Resolve a provider reference.
    fn resolve_provider(&self, provider: &ProviderRef) -> Result<ResolvedProvider, ResolutionError>;
}

/// Resolves provisioner type names to live provisioners.
pub trait ProvisionerResolver: Send + Sync {
    /// Resolve a provisioner by type name.
    fn resolve_provisioner(&self, name: &str) -> Result<ResolvedProvisioner, ResolutionError>;
}

/// A provider that only declares a fixed schema.
///
/// Used for providers described in workspace files, where there is no
/// provider-specific validation beyond the schema.
#[derive(Debug, Clone)]
pub struct SchemaProvider {
    name: String,
    schema: ProviderSchema,
}

impl SchemaProvider {
    /// Create a provider with a fixed schema.
    pub fn new(name: impl Into<String>, schema: ProviderSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl ResourceProvider for SchemaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Result<ProviderSchema, ResolutionError> {
        Ok(self.schema.clone())
    }
}

/// A provisioner that only declares a fixed schema.
#[derive(Debug, Clone)]
pub struct SchemaProvisioner {
    name: String,
    schema: Block,
}

impl SchemaProvisioner {
    /// Create a provisioner with a fixed schema.
    pub fn new(name: impl Into<String>, schema: Block) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl ResourceProvisioner for SchemaProvisioner {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Result<Block, ResolutionError> {
        Ok(self.schema.clone())
    }
}
