//! Validation walks over a whole configuration.

pub mod progress;
pub mod walker;

pub use progress::{WalkCallback, WalkEvent, WalkTracker};
pub use walker::{WalkOptions, WalkReport, WalkStats, Walker};
