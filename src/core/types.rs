//! Value types that flow through resource configuration.
//!
//! The type system is enum-based:
//! - Closed set of types: configuration languages have a small set of primitives
//! - `Unknown` is a first-class value so validation can proceed before apply
//! - Serialization: serde handles enums natively

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configuration value.
///
/// `Unknown` stands for a value that cannot be computed until resources
/// exist. It conforms to every type so shape checks can still run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<Value>),
    /// String-keyed map, insertion ordered
    Map(IndexMap<String, Value>),
    /// Not yet known
    #[serde(skip)]
    Unknown,
}

/// Attribute types declared by provider and provisioner schemas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Bool,
    Number,
    String,
    /// List of a specific element type
    List(Box<AttributeType>),
    /// Map with string keys and values of a specific type
    Map(Box<AttributeType>),
    /// Accepts any value
    Any,
}

// ============================================================================
// Value Implementation
// ============================================================================

impl Value {
    /// Short name of the value's type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Unknown => "unknown",
        }
    }

    /// Whether this value, or anything nested in it, is unknown.
    pub fn is_unknown(&self) -> bool {
        match self {
            Value::Unknown => true,
            Value::List(items) => items.iter().any(Value::is_unknown),
            Value::Map(map) => map.values().any(Value::is_unknown),
            _ => false,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get this value as an integer.
    ///
    /// Whole floating point numbers convert; fractional ones do not.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get this value as a float.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Try to get this value as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Try to get this value as a map.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        if let Value::Map(map) = self {
            Some(map)
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => write!(f, "list[{}]", items.len()),
            Value::Map(map) => write!(f, "map{{{} entries}}", map.len()),
            Value::Unknown => write!(f, "(known after apply)"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ============================================================================
// AttributeType Implementation
// ============================================================================

impl AttributeType {
    /// Check if a value conforms to this type.
    ///
    /// Null and unknown values conform to every type; requiredness is
    /// checked separately by the schema.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (_, Value::Unknown) => true,
            (AttributeType::Any, _) => true,
            (AttributeType::Bool, Value::Bool(_)) => true,
            (AttributeType::Number, Value::Integer(_) | Value::Number(_)) => true,
            (AttributeType::String, Value::String(_)) => true,
            // Primitives convert to string the way configuration languages allow
            (AttributeType::String, Value::Integer(_) | Value::Number(_) | Value::Bool(_)) => true,
            (AttributeType::List(inner), Value::List(items)) => {
                items.iter().all(|v| inner.matches(v))
            }
            (AttributeType::Map(inner), Value::Map(map)) => map.values().all(|v| inner.matches(v)),
            _ => false,
        }
    }

    /// Get a human-readable name for this type.
    pub fn display_name(&self) -> String {
        match self {
            AttributeType::Bool => "bool".to_string(),
            AttributeType::Number => "number".to_string(),
            AttributeType::String => "string".to_string(),
            AttributeType::List(inner) => format!("list({})", inner.display_name()),
            AttributeType::Map(inner) => format!("map({})", inner.display_name()),
            AttributeType::Any => "any".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
