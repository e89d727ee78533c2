//! Graph module for resource dependency graphs.
//!
//! A resource graph is a directed acyclic graph where vertices are resource
//! declarations or expanded instances and edges point from a vertex to the
//! vertices it depends on.

pub mod serialization;
pub mod structure;
pub mod topology;

// Re-export commonly used types
pub use serialization::SerializedGraph;
pub use structure::{ResourceGraph, Vertex};
pub use topology::TopologyAnalyzer;
