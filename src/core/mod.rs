//! Core types for the resgraph expansion and validation engine.
//!
//! This module contains the foundational types everything else builds on:
//! - Addresses of resources, instances and providers
//! - Values, attribute types and unevaluated expressions
//! - Declared resource configuration
//! - Diagnostics and error types

pub mod address;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod types;

// Re-export commonly used types
pub use address::{
    InstanceKey, ProviderRef, ResourceAddress, ResourceInstanceAddress, ResourceMode, Target,
};
pub use config::{Body, ProvisionerConfig, ResourceConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{DiagnosticsError, ErrorKind, EvalError, GraphError, ResolutionError};
pub use expr::{EvalScope, Expr, KnownValues, Reference};
pub use types::{AttributeType, Value};
