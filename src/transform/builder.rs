//! Ordered graph construction.

use crate::core::diagnostics::Diagnostics;
use crate::core::error::EvalError;
use crate::graph::structure::ResourceGraph;
use crate::transform::GraphTransformer;
use log::{debug, trace};
use std::time::Instant;

/// Builds a graph by running transformers in order.
///
/// The first transformer that fails aborts the build; the graph built so far
/// is returned together with the diagnostics collected up to that point.
pub struct GraphBuilder<'a> {
    steps: Vec<Box<dyn GraphTransformer + 'a>>,
    validate: bool,
    name: String,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder with no steps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            validate: false,
            name: name.into(),
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: impl GraphTransformer + 'a) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Check the finished graph for cycles, self-loops and a single root.
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Names of the steps, in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step and return the graph with the collected diagnostics.
    pub fn build(self) -> (ResourceGraph, Diagnostics) {
        let start = Instant::now();
        let mut graph = ResourceGraph::new().with_name(self.name.clone());
        let mut diags = Diagnostics::new();

        for step in &self.steps {
            trace!("{}: running {}", self.name, step.name());
            if let Err(step_diags) = step.transform(&mut graph) {
                debug!("{}: {} failed, aborting build", self.name, step.name());
                diags.extend(step_diags);
                return (graph, diags);
            }
        }

        if self.validate {
            if let Err(error) = graph.validate() {
                diags.push(EvalError::graph_build(&self.name, error));
            }
        }

        debug!(
            "{}: built {} vertices, {} edges in {:?}",
            self.name,
            graph.vertex_count(),
            graph.edge_count(),
            start.elapsed()
        );
        (graph, diags)
    }
}
