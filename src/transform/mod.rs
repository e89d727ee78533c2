//! Graph transformers.
//!
//! A graph is built by running a fixed list of transformers over an empty
//! [`ResourceGraph`](crate::graph::ResourceGraph). Each transformer does one
//! job and knows nothing of the others.

pub mod builder;
pub mod transformers;

pub use builder::GraphBuilder;
pub use transformers::{
    AttachStateTransformer, ConfigTransformer, ReferenceTransformer, ResourceCountTransformer,
    RootTransformer, TargetsTransformer,
};

use crate::core::diagnostics::Diagnostics;
use crate::graph::structure::ResourceGraph;

/// One step of graph construction.
pub trait GraphTransformer {
    /// Name of this step, for logs.
    fn name(&self) -> &str;

    /// Modify the graph in place.
    ///
    /// An `Err` aborts the build; its diagnostics are reported.
    fn transform(&self, graph: &mut ResourceGraph) -> Result<(), Diagnostics>;
}
