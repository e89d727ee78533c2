//! Ordered evaluation of validation steps.
//!
//! A sequence runs its steps in order. Each step reads the
//! [`SequenceState`] produced so far and returns its diagnostics plus any
//! outputs; the sequence merges outputs into write-once slots before the
//! next step runs. A fatal diagnostic halts the sequence, non-fatal ones are
//! collected and later steps still run.

use crate::core::diagnostics::Diagnostics;
use crate::core::error::{EvalError, EvalResult};
use crate::plugin::provider::{ResolvedProvider, ResolvedProvisioner};
use indexmap::IndexMap;
use log::{debug, trace};

/// Values produced by earlier steps for later ones.
#[derive(Debug, Default)]
pub struct SequenceState {
    provider: Option<ResolvedProvider>,
    provisioners: IndexMap<usize, ResolvedProvisioner>,
}

impl SequenceState {
    /// The resolved provider, once a step has produced it.
    pub fn provider(&self) -> Option<&ResolvedProvider> {
        self.provider.as_ref()
    }

    /// The resolved provisioner at a declaration index, once produced.
    pub fn provisioner(&self, index: usize) -> Option<&ResolvedProvisioner> {
        self.provisioners.get(&index)
    }

    /// Store a step output. Each slot may be written once.
    pub fn merge(&mut self, output: StepOutput) -> EvalResult<()> {
        match output {
            StepOutput::Provider(resolved) => {
                if self.provider.is_some() {
                    return Err(EvalError::graph_build("sequence", "provider slot written twice"));
                }
                self.provider = Some(resolved);
            }
            StepOutput::Provisioner { index, resolved } => {
                if self.provisioners.contains_key(&index) {
                    return Err(EvalError::graph_build(
                        "sequence",
                        format!("provisioner slot {} written twice", index),
                    ));
                }
                self.provisioners.insert(index, resolved);
            }
        }
        Ok(())
    }
}

/// Something a step hands forward to later steps.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// The resource's provider
    Provider(ResolvedProvider),
    /// The provisioner declared at `index`
    Provisioner {
        /// Declaration index among the resource's provisioners
        index: usize,
        /// The resolved provisioner
        resolved: ResolvedProvisioner,
    },
}

/// Result of running one step.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Outputs to merge into the sequence state
    pub outputs: Vec<StepOutput>,
    /// Problems found
    pub diagnostics: Diagnostics,
}

impl StepResult {
    /// Nothing to report.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A single output and no problems.
    pub fn output(output: StepOutput) -> Self {
        Self {
            outputs: vec![output],
            diagnostics: Diagnostics::new(),
        }
    }

    /// Only diagnostics.
    pub fn diagnostics(diagnostics: Diagnostics) -> Self {
        Self {
            outputs: Vec::new(),
            diagnostics,
        }
    }

    /// A single error.
    pub fn error(error: EvalError) -> Self {
        Self::diagnostics(error.into())
    }
}

/// One validation step.
pub trait EvalStep: Send + Sync {
    /// Step name for logs.
    fn name(&self) -> &'static str;

    /// Run the step against the state produced so far.
    fn eval(&self, state: &SequenceState) -> StepResult;
}

/// An ordered list of steps belonging to one node.
pub struct EvalSequence {
    address: String,
    steps: Vec<Box<dyn EvalStep>>,
}

impl EvalSequence {
    /// Create an empty sequence for the node at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn push(&mut self, step: impl EvalStep + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Names of the steps, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step and return the collected diagnostics.
    pub fn run(self) -> Diagnostics {
        self.run_with_state().1
    }

    /// Run every step and return the final state with the diagnostics.
    pub fn run_with_state(self) -> (SequenceState, Diagnostics) {
        let mut state = SequenceState::default();
        let mut diags = Diagnostics::new();

        for step in &self.steps {
            trace!("{}: running {}", self.address, step.name());
            let result = step.eval(&state);
            let mut fatal = result.diagnostics.has_fatal();
            diags.extend(result.diagnostics.with_default_address(&self.address));

            for output in result.outputs {
                if let Err(error) = state.merge(output) {
                    diags.push(error);
                    fatal = true;
                }
            }

            if fatal {
                debug!("{}: halted after {}", self.address, step.name());
                break;
            }
        }

        (state, diags)
    }
}
