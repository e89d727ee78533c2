//! Configuration expressions and their evaluation.
//!
//! Expressions are kept unevaluated in resource configuration so that the
//! graph can inspect their references before any value is known. Evaluation
//! happens against [`KnownValues`]: input variables are available, resource
//! attributes are not, and come back as [`Value::Unknown`].

use crate::core::address::{InstanceKey, ResourceAddress};
use crate::core::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Something an expression can refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A resource or one of its instances, optionally with an attribute path
    Resource {
        /// Referenced resource
        resource: ResourceAddress,
        /// Specific instance, if indexed
        key: Option<InstanceKey>,
        /// Attribute path below the instance
        attribute: Vec<String>,
    },
    /// An input variable, `var.NAME`
    Variable(String),
    /// The index of the instance being evaluated, `count.index`
    CountIndex,
}

impl Reference {
    /// Reference to a whole resource.
    pub fn resource(resource: ResourceAddress) -> Self {
        Reference::Resource {
            resource,
            key: None,
            attribute: Vec::new(),
        }
    }

    /// Reference to an attribute of a resource.
    pub fn attribute(resource: ResourceAddress, attribute: impl Into<String>) -> Self {
        Reference::Resource {
            resource,
            key: None,
            attribute: vec![attribute.into()],
        }
    }

    /// The referenced resource, if this is a resource reference.
    pub fn resource_addr(&self) -> Option<&ResourceAddress> {
        match self {
            Reference::Resource { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Parse the textual form used in configuration files:
    /// `var.NAME`, `count.index`, `[data.]TYPE.NAME[INDEX].ATTR...`.
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let input = input.trim();
        if input == "count.index" {
            return Ok(Reference::CountIndex);
        }
        if let Some(name) = input.strip_prefix("var.") {
            if name.is_empty() || name.contains('.') {
                return Err(ExprError::InvalidReference(input.to_string()));
            }
            return Ok(Reference::Variable(name.to_string()));
        }

        let mut segments: Vec<&str> = input.split('.').collect();
        let data = segments.first() == Some(&"data");
        if data {
            segments.remove(0);
        }
        if segments.len() < 2 {
            return Err(ExprError::InvalidReference(input.to_string()));
        }

        let type_name = segments[0];
        let (name, key) = match segments[1].split_once('[') {
            Some((name, rest)) => {
                let index = rest
                    .strip_suffix(']')
                    .and_then(|i| i.parse::<usize>().ok())
                    .ok_or_else(|| ExprError::InvalidReference(input.to_string()))?;
                (name, Some(InstanceKey::Int(index)))
            }
            None => (segments[1], None),
        };
        if type_name.is_empty() || name.is_empty() {
            return Err(ExprError::InvalidReference(input.to_string()));
        }

        let resource = if data {
            ResourceAddress::data(type_name, name)
        } else {
            ResourceAddress::managed(type_name, name)
        };
        Ok(Reference::Resource {
            resource,
            key,
            attribute: segments[2..].iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Resource {
                resource,
                key,
                attribute,
            } => {
                write!(f, "{}", resource)?;
                if let Some(InstanceKey::Int(i)) = key {
                    write!(f, "[{}]", i)?;
                }
                for part in attribute {
                    write!(f, ".{}", part)?;
                }
                Ok(())
            }
            Reference::Variable(name) => write!(f, "var.{}", name),
            Reference::CountIndex => write!(f, "count.index"),
        }
    }
}

/// An unevaluated configuration expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant
    Literal(Value),
    /// A single reference
    Reference(Reference),
    /// String interpolation: literal parts and references, concatenated
    Template(Vec<TemplatePart>),
    /// List constructor
    List(Vec<Expr>),
    /// Map constructor
    Map(IndexMap<String, Expr>),
}

/// One segment of a template expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text
    Text(String),
    /// Interpolated reference
    Interpolation(Reference),
}

/// Errors from parsing or evaluating expressions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Invalid reference '{0}'")]
    InvalidReference(String),

    #[error("Reference to undeclared input variable '{0}'")]
    UndeclaredVariable(String),

    #[error("count.index is only valid within a resource that has count set")]
    CountIndexOutsideInstance,

    #[error("Unterminated interpolation in '{0}'")]
    UnterminatedInterpolation(String),
}

/// Values available for evaluation before any instance exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownValues {
    /// Input variable values
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
}

impl KnownValues {
    /// Create an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an input variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Where an expression is being evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalScope {
    /// Instance key of the instance being evaluated, when there is one
    pub key: Option<InstanceKey>,
}

impl Expr {
    /// Shorthand for a literal.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Parse the textual form used in configuration files.
    ///
    /// `"${ref}"` alone is a reference; text containing `${...}` is a
    /// template; `"${unknown}"` is the unknown sentinel; everything else is
    /// a literal. Lists and maps are parsed element-wise.
    pub fn from_value(value: Value) -> Result<Self, ExprError> {
        match value {
            Value::String(s) => Self::parse_string(&s),
            Value::List(items) => items
                .into_iter()
                .map(Self::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Expr::List),
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| Self::from_value(v).map(|e| (k, e)))
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(Expr::Map),
            other => Ok(Expr::Literal(other)),
        }
    }

    fn parse_string(s: &str) -> Result<Self, ExprError> {
        if !s.contains("${") {
            return Ok(Expr::Literal(Value::String(s.to_string())));
        }

        let mut parts = Vec::new();
        let mut rest = s;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                parts.push(TemplatePart::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| ExprError::UnterminatedInterpolation(s.to_string()))?;
            let inner = after[..end].trim();
            if inner == "unknown" && parts.is_empty() && after[end + 1..].is_empty() {
                return Ok(Expr::Literal(Value::Unknown));
            }
            parts.push(TemplatePart::Interpolation(Reference::parse(inner)?));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }

        match parts.as_slice() {
            [TemplatePart::Interpolation(reference)] => Ok(Expr::Reference(reference.clone())),
            _ => Ok(Expr::Template(parts)),
        }
    }

    /// All references in this expression, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a Reference>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Reference(r) => refs.push(r),
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(r) = part {
                        refs.push(r);
                    }
                }
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_references(refs)),
            Expr::Map(map) => map.values().for_each(|e| e.collect_references(refs)),
        }
    }

    /// Evaluate against known values.
    pub fn evaluate(&self, values: &KnownValues, scope: EvalScope) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Reference(reference) => evaluate_reference(reference, values, scope),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Interpolation(reference) => {
                            match evaluate_reference(reference, values, scope)? {
                                Value::String(s) => out.push_str(&s),
                                value if value.is_unknown() => return Ok(Value::Unknown),
                                Value::Null => {}
                                value => out.push_str(value.to_string().trim_matches('"')),
                            }
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::List(items) => items
                .iter()
                .map(|e| e.evaluate(values, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Map(map) => map
                .iter()
                .map(|(k, e)| e.evaluate(values, scope).map(|v| (k.clone(), v)))
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(Value::Map),
        }
    }
}

fn evaluate_reference(
    reference: &Reference,
    values: &KnownValues,
    scope: EvalScope,
) -> Result<Value, ExprError> {
    match reference {
        Reference::Variable(name) => values
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UndeclaredVariable(name.clone())),
        Reference::CountIndex => match scope.key {
            Some(InstanceKey::Int(i)) => Ok(Value::Integer(i as i64)),
            Some(InstanceKey::NoKey) => Err(ExprError::CountIndexOutsideInstance),
            // Evaluating for the declaration: the index exists but is not known yet
            None => Ok(Value::Unknown),
        },
        // Resource attributes are computed during apply
        Reference::Resource { .. } => Ok(Value::Unknown),
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}
