//! Evaluation sequences: the ordered validation work done for one node.

pub mod context;
pub mod sequence;
pub mod steps;

pub use context::EvalContext;
pub use sequence::{EvalSequence, EvalStep, SequenceState, StepOutput, StepResult};
