//! Resource and instance nodes.
//!
//! A [`ResourceNode`] stands for a declaration whose count is not yet known.
//! Expanding it produces a sub-graph of [`ResourceInstanceNode`]s, one per
//! instance key.

pub mod count;
pub mod instance;
pub mod resource;

pub use count::{resolve_count, ExpandCount, MAX_COUNT};
pub use instance::ResourceInstanceNode;
pub use resource::ResourceNode;
