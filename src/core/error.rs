//! Error types for resgraph.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Carry the address of the resource they concern
//! - Map onto exactly one diagnostic kind
//! - Support error chaining for context

use crate::core::address::{ProviderRef, ResourceAddress};
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::expr::ExprError;
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed, negative or non-numeric count
    InvalidCount,
    /// A resource references itself
    SelfReference,
    /// No provider matches the resource's provider reference
    ProviderResolution,
    /// No provisioner matches a declared provisioner
    ProvisionerResolution,
    /// Configuration does not conform to its schema
    SchemaValidation,
    /// Any other graph construction failure
    GraphBuild,
}

impl ErrorKind {
    /// Whether an error of this kind stops the current sequence or pipeline.
    ///
    /// Schema violations are collected so every configuration problem is
    /// reported in one pass; everything else halts.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::SchemaValidation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidCount => "invalid count",
            ErrorKind::SelfReference => "self reference",
            ErrorKind::ProviderResolution => "provider resolution",
            ErrorKind::ProvisionerResolution => "provisioner resolution",
            ErrorKind::SchemaValidation => "schema validation",
            ErrorKind::GraphBuild => "graph build",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while evaluating or expanding a node.
///
/// Each variant maps onto one [`ErrorKind`] and converts into a
/// [`Diagnostic`] for accumulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Invalid count for {address}: {reason}")]
    InvalidCount {
        address: ResourceAddress,
        reason: String,
    },

    #[error("Self-referential block: {address} cannot refer to itself ({reference})")]
    SelfReference {
        address: ResourceAddress,
        reference: String,
    },

    #[error("Provider {provider} required by {address} is not available: {source}")]
    ProviderResolution {
        address: ResourceAddress,
        provider: String,
        source: ResolutionError,
    },

    #[error("Provisioner '{provisioner}' required by {address} is not available: {source}")]
    ProvisionerResolution {
        address: ResourceAddress,
        provisioner: String,
        source: ResolutionError,
    },

    #[error("Invalid configuration for {subject}, {path}: {reason}")]
    SchemaValidation {
        subject: String,
        path: String,
        reason: String,
    },

    #[error("Graph build failed in {stage}: {reason}")]
    GraphBuild { stage: String, reason: String },
}

impl EvalError {
    /// The diagnostic kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::InvalidCount { .. } => ErrorKind::InvalidCount,
            EvalError::SelfReference { .. } => ErrorKind::SelfReference,
            EvalError::ProviderResolution { .. } => ErrorKind::ProviderResolution,
            EvalError::ProvisionerResolution { .. } => ErrorKind::ProvisionerResolution,
            EvalError::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            EvalError::GraphBuild { .. } => ErrorKind::GraphBuild,
        }
    }

    /// Address the error concerns, if it concerns one resource.
    pub fn address(&self) -> Option<String> {
        match self {
            EvalError::InvalidCount { address, .. }
            | EvalError::SelfReference { address, .. }
            | EvalError::ProviderResolution { address, .. }
            | EvalError::ProvisionerResolution { address, .. } => Some(address.to_string()),
            EvalError::SchemaValidation { subject, .. } => Some(subject.clone()),
            EvalError::GraphBuild { .. } => None,
        }
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            EvalError::InvalidCount { .. } => {
                Some("count must be a whole number greater than or equal to zero".to_string())
            }
            EvalError::SelfReference { .. } => Some(
                "Use 'self' inside provisioners, or remove the reference from the resource body"
                    .to_string(),
            ),
            EvalError::ProviderResolution { provider, .. } => {
                Some(format!("Configure {} or check its version constraint", provider))
            }
            EvalError::ProvisionerResolution { provisioner, .. } => {
                Some(format!("Install the '{}' provisioner", provisioner))
            }
            _ => None,
        }
    }

    /// Shorthand for a graph build failure.
    pub fn graph_build(stage: impl Into<String>, reason: impl fmt::Display) -> Self {
        EvalError::GraphBuild {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an invalid count.
    pub fn invalid_count(address: &ResourceAddress, reason: impl fmt::Display) -> Self {
        EvalError::InvalidCount {
            address: address.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to resolve a provider or provisioner handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no plugin named '{0}' is registered")]
    NotFound(String),

    #[error("{provider} has no version matching {required} (available: {available})")]
    VersionMismatch {
        provider: String,
        required: String,
        available: String,
    },

    #[error("configuration {0} is not declared")]
    UnknownAlias(String),

    #[error("failed to load schema: {0}")]
    Schema(String),

    #[error("resource has no resolved provider")]
    Unresolved,
}

impl ResolutionError {
    /// Convert into an [`EvalError`] for the given resource and provider.
    pub fn for_provider(self, address: &ResourceAddress, provider: &ProviderRef) -> EvalError {
        EvalError::ProviderResolution {
            address: address.clone(),
            provider: provider.to_string(),
            source: self,
        }
    }
}

/// Errors related to graph structure and operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Vertex {0:?} not found")]
    VertexNotFound(NodeIndex),

    #[error("Cycle detected in graph involving: {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    #[error("Self-loop on vertex {0}")]
    SelfLoop(String),

    #[error("Graph must have exactly one root, found {0}")]
    InvalidRoot(usize),
}

impl From<GraphError> for EvalError {
    fn from(error: GraphError) -> Self {
        EvalError::graph_build("graph", error)
    }
}

impl From<ExprError> for Diagnostic {
    fn from(error: ExprError) -> Self {
        Diagnostic::error(ErrorKind::SchemaValidation, error.to_string())
    }
}

/// Terminal failure: the diagnostics of a sequence, pipeline or walk that
/// contained at least one error.
///
/// The wrapped collection keeps its warnings so callers can still report them.
#[derive(Error, Debug, Clone)]
#[error("{}", .0.summary())]
pub struct DiagnosticsError(pub Diagnostics);

impl DiagnosticsError {
    /// Borrow the underlying diagnostics.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.0
    }

    /// Take the underlying diagnostics.
    pub fn into_diagnostics(self) -> Diagnostics {
        self.0
    }
}

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for evaluation operations.
pub type EvalResult<T> = Result<T, EvalError>;
