//! Provider and provisioner plugins.
//!
//! Providers implement resource types and declare their schemas;
//! provisioners run actions against created resources. The evaluation
//! sequence reaches both only through the resolver traits, so any host can
//! be plugged in. The registries here are the in-process implementation.

pub mod builtin;
pub mod cache;
pub mod provider;
pub mod registry;
pub mod schema;

pub use provider::{
    ProviderResolver, ProviderSchema, ProvisionerResolver, ResolvedProvider, ResolvedProvisioner,
    ResourceProvider, ResourceProvisioner,
};
pub use registry::{ProviderRegistry, ProvisionerRegistry};
pub use schema::{Attribute, Block, NestedBlock};
