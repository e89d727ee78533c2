//! # resgraph - Resource Graph Expansion and Validation
//!
//! resgraph turns declared infrastructure resources into a dependency graph,
//! expands each counted resource into its instances and validates every
//! instance against the schemas its provider and provisioners declare.
//!
//! ## Features
//!
//! - **Graph construction**: Build graphs from a fixed list of single-purpose transformers
//! - **Count expansion**: Expand a resource into dense `[0, n)` instances, or a single
//!   un-indexed one
//! - **Evaluation sequences**: Ordered, halting validation steps per node
//! - **Diagnostics**: Every problem collected and reported, not just the first
//! - **Parallel walks**: Independent resources validated concurrently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resgraph::prelude::*;
//!
//! let mut providers = ProviderRegistry::new();
//! providers.register_schema("aws", Version::new(5, 0, 0), schema);
//!
//! let ctx = EvalContext::new(Arc::new(providers), Arc::new(ProvisionerRegistry::with_builtins()));
//!
//! let web = ResourceConfig::managed("aws_instance", "web")
//!     .with_count(Expr::literal(3i64))
//!     .with_body(Body::new().with_attribute("ami", Expr::literal("ami-123")));
//!
//! let report = Walker::new(ctx).validate(&[Arc::new(web)]);
//! println!("{}", report.diagnostics.summary());
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Addresses, values, expressions, configuration and diagnostics
//! - [`graph`]: Graph structure, topology and export
//! - [`transform`]: Graph transformers and the builder that runs them
//! - [`eval`]: Evaluation sequences and their steps
//! - [`node`]: Resource and instance nodes, count resolution
//! - [`plugin`]: Provider and provisioner schemas and registries
//! - [`walk`]: Whole-configuration validation walks
//! - [`workspace`]: Loading configurations from files

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod eval;
pub mod graph;
pub mod node;
pub mod plugin;
pub mod state;
pub mod transform;
pub mod walk;
pub mod workspace;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use resgraph::prelude::*;
/// ```
pub mod prelude {
    // Addresses and values
    pub use crate::core::address::{
        InstanceKey, ProviderRef, ResourceAddress, ResourceInstanceAddress, ResourceMode, Target,
    };
    pub use crate::core::types::{AttributeType, Value};

    // Configuration
    pub use crate::core::config::{
        Body, OnFailure, ProvisionerConfig, ProvisionerWhen, ResourceConfig,
    };
    pub use crate::core::expr::{EvalScope, Expr, KnownValues, Reference};

    // Errors
    pub use crate::core::diagnostics::{Diagnostic, Diagnostics, Severity};
    pub use crate::core::error::{
        DiagnosticsError, ErrorKind, EvalError, GraphError, ResolutionError,
    };

    // Graph
    pub use crate::graph::serialization::SerializedGraph;
    pub use crate::graph::structure::{ResourceGraph, Vertex};
    pub use crate::graph::topology::TopologyAnalyzer;

    // Construction
    pub use crate::transform::{GraphBuilder, GraphTransformer};

    // Evaluation
    pub use crate::eval::context::EvalContext;
    pub use crate::eval::sequence::{EvalSequence, EvalStep};
    pub use crate::node::{resolve_count, ExpandCount, ResourceInstanceNode, ResourceNode};

    // Plugins
    pub use crate::plugin::provider::{ProviderSchema, ResourceProvider, ResourceProvisioner};
    pub use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
    pub use crate::plugin::schema::{Attribute, Block, NestedBlock};
    pub use semver::Version;

    // State
    pub use crate::state::{InstanceState, SharedState, State};

    // Walks
    pub use crate::walk::{WalkEvent, WalkOptions, WalkReport, Walker};
    pub use crate::workspace::{Workspace, WorkspaceError};

    pub use std::sync::Arc;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
