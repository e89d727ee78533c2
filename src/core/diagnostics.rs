//! Accumulated warnings and errors.
//!
//! Graph construction and validation collect diagnostics rather than failing
//! on the first problem. A collection only becomes a terminal failure when it
//! holds at least one error; warnings alone never fail anything.

use crate::core::error::{DiagnosticsError, ErrorKind, EvalError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, never fails
    Warning,
    /// Fails the enclosing operation
    Error,
}

/// A single warning or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Warning or error
    pub severity: Severity,
    /// What kind of problem this is
    pub kind: ErrorKind,
    /// One-line description
    pub summary: String,
    /// Longer explanation or suggestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Address of the resource or instance concerned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(kind: ErrorKind, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: None,
            address: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(kind: ErrorKind, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            summary: summary.into(),
            detail: None,
            address: None,
        }
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the address concerned.
    pub fn with_address(mut self, address: impl fmt::Display) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether this is an error that should halt the current sequence.
    pub fn is_fatal(&self) -> bool {
        self.is_error() && self.kind.is_fatal()
    }
}

impl From<EvalError> for Diagnostic {
    fn from(error: EvalError) -> Self {
        let mut diagnostic = Diagnostic::error(error.kind(), error.to_string());
        diagnostic.address = error.address();
        diagnostic.detail = error.suggested_fix();
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        write!(f, "{}: {}", label, self.summary)
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one diagnostic.
    pub fn push(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.entries.push(diagnostic.into());
    }

    /// Append an error of the given kind.
    pub fn error(&mut self, kind: ErrorKind, summary: impl Into<String>) {
        self.push(Diagnostic::error(kind, summary));
    }

    /// Append a warning of the given kind.
    pub fn warning(&mut self, kind: ErrorKind, summary: impl Into<String>) {
        self.push(Diagnostic::warning(kind, summary));
    }

    /// Append every entry of another collection, preserving order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Attach an address to every entry that has none.
    pub fn with_default_address(mut self, address: impl fmt::Display) -> Self {
        let address = address.to_string();
        for entry in self.entries.iter_mut().filter(|d| d.address.is_none()) {
            entry.address = Some(address.clone());
        }
        self
    }

    /// Whether any entry is an error.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    /// Whether any entry is an error that halts a sequence.
    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_fatal)
    }

    /// All entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Error entries in order.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.is_error())
    }

    /// Warning entries in order.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| !d.is_error())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Terminal failure, if there is one.
    ///
    /// `None` iff no entry is an error, however many warnings there are.
    pub fn err(&self) -> Option<DiagnosticsError> {
        if self.has_errors() {
            Some(DiagnosticsError(self.clone()))
        } else {
            None
        }
    }

    /// Convert into a result: `Ok` with the (warning-only) diagnostics when
    /// there are no errors, otherwise the terminal failure.
    pub fn into_result(self) -> Result<Diagnostics, DiagnosticsError> {
        if self.has_errors() {
            Err(DiagnosticsError(self))
        } else {
            Ok(self)
        }
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        let errors = self.errors().count();
        let warnings = self.len() - errors;
        match (errors, warnings) {
            (0, 0) => "no problems found".to_string(),
            (0, w) => format!("{} warning(s)", w),
            (1, 0) => self.errors().next().map(|d| d.summary.clone()).unwrap_or_default(),
            (e, 0) => format!("{} error(s)", e),
            (e, w) => format!("{} error(s), {} warning(s)", e, w),
        }
    }

    /// Get detailed messages with details and addresses, one per entry.
    pub fn detailed(&self) -> Vec<String> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut msg = format!("{}. {}", i + 1, d);
                if let Some(address) = &d.address {
                    msg.push_str(&format!("\n   on {}", address));
                }
                if let Some(detail) = &d.detail {
                    msg.push_str(&format!("\n   → {}", detail));
                }
                msg
            })
            .collect()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            entries: vec![diagnostic],
        }
    }
}

impl From<EvalError> for Diagnostics {
    fn from(error: EvalError) -> Self {
        Diagnostic::from(error).into()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
