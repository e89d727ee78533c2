//! Registries of available providers and provisioners.

use crate::core::address::ProviderRef;
use crate::core::error::ResolutionError;
use crate::plugin::cache::{CacheStats, SchemaCache};
use crate::plugin::provider::{
    ProviderResolver, ProviderSchema, ProvisionerResolver, ResolvedProvider, ResolvedProvisioner,
    ResourceProvider, ResourceProvisioner, SchemaProvider, SchemaProvisioner,
};
use crate::plugin::schema::Block;
use indexmap::IndexMap;
use log::debug;
use semver::Version;
use std::sync::Arc;

/// Factory function for creating provider instances.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn ResourceProvider> + Send + Sync>;

/// Factory function for creating provisioner instances.
pub type ProvisionerFactory = Arc<dyn Fn() -> Arc<dyn ResourceProvisioner> + Send + Sync>;

/// Registry entry for one provider type.
#[derive(Clone)]
pub struct ProviderEntry {
    /// Factory function to create instances.
    pub factory: ProviderFactory,
    /// Version of the registered provider.
    pub version: Version,
    /// Configured aliases, e.g. `east` for `provider.aws.east`.
    pub aliases: Vec<String>,
}

/// Registry of provider types.
///
/// Resolves [`ProviderRef`]s by type name, checks version constraints and
/// aliases, and caches each provider's schema after the first fetch.
pub struct ProviderRegistry {
    providers: IndexMap<String, ProviderEntry>,
    schemas: SchemaCache<ProviderSchema>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: IndexMap::new(),
            schemas: SchemaCache::default(),
        }
    }

    /// Register a provider type.
    pub fn register<F>(&mut self, name: impl Into<String>, version: Version, factory: F)
    where
        F: Fn() -> Arc<dyn ResourceProvider> + Send + Sync + 'static,
    {
        let name = name.into();
        self.schemas.invalidate(&name);
        self.providers.insert(
            name,
            ProviderEntry {
                factory: Arc::new(factory),
                version,
                aliases: Vec::new(),
            },
        );
    }

    /// Register a provider that only declares a fixed schema.
    pub fn register_schema(
        &mut self,
        name: impl Into<String>,
        version: Version,
        schema: ProviderSchema,
    ) {
        let name = name.into();
        let provider: Arc<dyn ResourceProvider> =
            Arc::new(SchemaProvider::new(name.clone(), schema));
        self.register(name, version, move || Arc::clone(&provider));
    }

    /// Declare an additional aliased configuration of a registered provider.
    ///
    /// Returns false if the provider is not registered.
    pub fn configure_alias(&mut self, name: &str, alias: impl Into<String>) -> bool {
        match self.providers.get_mut(name) {
            Some(entry) => {
                entry.aliases.push(alias.into());
                true
            }
            None => false,
        }
    }

    /// Get a registry entry.
    pub fn get_entry(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers.get(name)
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Get all registered provider names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|s| s.as_str())
    }

    /// Get the total number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Schema cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.schemas.stats()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderResolver for ProviderRegistry {
    fn resolve_provider(
        &self,
        provider: &ProviderRef,
    ) -> Result<ResolvedProvider, ResolutionError> {
        let entry = self
            .providers
            .get(&provider.type_name)
            .ok_or_else(|| ResolutionError::NotFound(provider.type_name.clone()))?;

        if let Some(required) = &provider.version {
            if !required.matches(&entry.version) {
                return Err(ResolutionError::VersionMismatch {
                    provider: provider.type_name.clone(),
                    required: required.to_string(),
                    available: entry.version.to_string(),
                });
            }
        }

        if let Some(alias) = &provider.alias {
            if !entry.aliases.contains(alias) {
                return Err(ResolutionError::UnknownAlias(provider.to_string()));
            }
        }

        let instance = (entry.factory)();
        let schema = self
            .schemas
            .get_or_load(&provider.type_name, || instance.schema())?;
        debug!("resolved {} at version {}", provider, entry.version);

        Ok(ResolvedProvider {
            provider: instance,
            schema,
        })
    }
}

/// Registry of provisioner types.
pub struct ProvisionerRegistry {
    provisioners: IndexMap<String, ProvisionerFactory>,
    schemas: SchemaCache<Block>,
}

impl ProvisionerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            provisioners: IndexMap::new(),
            schemas: SchemaCache::default(),
        }
    }

    /// Create a registry pre-populated with the built-in provisioners.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // Register built-in provisioners
        crate::plugin::builtin::register_all(&mut registry);

        registry
    }

    /// Register a provisioner type.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ResourceProvisioner> + Send + Sync + 'static,
    {
        let name = name.into();
        self.schemas.invalidate(&name);
        self.provisioners.insert(name, Arc::new(factory));
    }

    /// Register a provisioner that only declares a fixed schema.
    pub fn register_schema(&mut self, name: impl Into<String>, schema: Block) {
        let name = name.into();
        let provisioner: Arc<dyn ResourceProvisioner> =
            Arc::new(SchemaProvisioner::new(name.clone(), schema));
        self.register(name, move || Arc::clone(&provisioner));
    }

    /// Check if a provisioner is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.provisioners.contains_key(name)
    }

    /// Get all registered provisioner names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.provisioners.keys().map(|s| s.as_str())
    }

    /// Get the total number of registered provisioners.
    pub fn len(&self) -> usize {
        self.provisioners.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }

    /// Schema cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.schemas.stats()
    }
}

impl Default for ProvisionerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProvisionerResolver for ProvisionerRegistry {
    fn resolve_provisioner(&self, name: &str) -> Result<ResolvedProvisioner, ResolutionError> {
        let factory = self
            .provisioners
            .get(name)
            .ok_or_else(|| ResolutionError::NotFound(name.to_string()))?;

        let instance = factory();
        let schema = self.schemas.get_or_load(name, || instance.schema())?;

        Ok(ResolvedProvisioner {
            provisioner: instance,
            schema,
        })
    }
}
