//! Configuration schemas and body validation.
//!
//! Validation never stops at the first problem. Every violation in a body
//! becomes its own `SchemaValidation` diagnostic, and deprecated attributes
//! are reported as warnings.

use crate::core::config::{Body, NestedBody};
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::{ErrorKind, EvalError};
use crate::core::expr::{EvalScope, KnownValues};
use crate::core::types::{AttributeType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn any_type() -> AttributeType {
    AttributeType::Any
}

/// Schema of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Expected value type
    #[serde(rename = "type", default = "any_type")]
    pub attr_type: AttributeType,
    /// Must be set
    #[serde(default)]
    pub required: bool,
    /// May be set
    #[serde(default)]
    pub optional: bool,
    /// Set by the provider
    #[serde(default)]
    pub computed: bool,
    /// Deprecation message, if the attribute is deprecated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    fn with_flags(
        attr_type: AttributeType,
        required: bool,
        optional: bool,
        computed: bool,
    ) -> Self {
        Self {
            attr_type,
            required,
            optional,
            computed,
            deprecated: None,
            description: None,
        }
    }

    /// A required attribute.
    pub fn required(attr_type: AttributeType) -> Self {
        Self::with_flags(attr_type, true, false, false)
    }

    /// An optional attribute.
    pub fn optional(attr_type: AttributeType) -> Self {
        Self::with_flags(attr_type, false, true, false)
    }

    /// An attribute only the provider sets.
    pub fn computed(attr_type: AttributeType) -> Self {
        Self::with_flags(attr_type, false, false, true)
    }

    /// Mark as deprecated.
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether configuration may not set this attribute at all.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Schema of a nested block type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Schema of each block
    pub block: Block,
    /// Minimum number of blocks
    #[serde(default)]
    pub min_items: usize,
    /// Maximum number of blocks, 0 for unlimited
    #[serde(default)]
    pub max_items: usize,
}

impl NestedBlock {
    /// Any number of blocks.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            min_items: 0,
            max_items: 0,
        }
    }

    /// At most one block.
    pub fn single(block: Block) -> Self {
        Self {
            block,
            min_items: 0,
            max_items: 1,
        }
    }

    /// Set the minimum number of blocks.
    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = min;
        self
    }
}

/// Schema of a configuration body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Attributes by name
    #[serde(default)]
    pub attributes: IndexMap<String, Attribute>,
    /// Nested block types by name
    #[serde(default)]
    pub blocks: IndexMap<String, NestedBlock>,
}

impl Block {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Add a nested block type.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Validate a body against this schema.
    ///
    /// `subject` names what is being validated (an instance address, or an
    /// instance address plus provisioner) and is attached to every
    /// diagnostic.
    pub fn validate(
        &self,
        body: &Body,
        values: &KnownValues,
        scope: EvalScope,
        subject: &str,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate_at(body, values, scope, subject, "", &mut diags);
        diags
    }

    fn validate_at(
        &self,
        body: &Body,
        values: &KnownValues,
        scope: EvalScope,
        subject: &str,
        prefix: &str,
        diags: &mut Diagnostics,
    ) {
        for (name, expr) in &body.attributes {
            let path = join_path(prefix, name);
            let Some(attribute) = self.attributes.get(name) else {
                diags.push(schema_error(
                    subject,
                    &path,
                    format!("an argument named \"{}\" is not expected here", name),
                ));
                continue;
            };

            if attribute.is_computed_only() {
                diags.push(schema_error(
                    subject,
                    &path,
                    "this attribute is computed by the provider and cannot be set",
                ));
                continue;
            }

            if let Some(message) = &attribute.deprecated {
                diags.push(
                    Diagnostic::warning(
                        ErrorKind::SchemaValidation,
                        format!("Argument {} is deprecated", path),
                    )
                    .with_detail(message.clone())
                    .with_address(subject),
                );
            }

            match expr.evaluate(values, scope) {
                Ok(Value::Null) if attribute.required => {
                    diags.push(schema_error(subject, &path, "required argument must not be null"));
                }
                Ok(value) if !attribute.attr_type.matches(&value) => {
                    diags.push(schema_error(
                        subject,
                        &path,
                        format!("{} required, got {}", attribute.attr_type, value.type_name()),
                    ));
                }
                Ok(_) => {}
                Err(error) => diags.push(schema_error(subject, &path, error)),
            }
        }

        for (name, attribute) in &self.attributes {
            if attribute.required && !body.attributes.contains_key(name) {
                diags.push(schema_error(
                    subject,
                    &join_path(prefix, name),
                    format!("the argument \"{}\" is required, but no definition was found", name),
                ));
            }
        }

        for nested in &body.blocks {
            if !self.blocks.contains_key(&nested.type_name) {
                diags.push(schema_error(
                    subject,
                    &join_path(prefix, &nested.type_name),
                    format!("blocks of type \"{}\" are not expected here", nested.type_name),
                ));
            }
        }

        for (type_name, nested) in &self.blocks {
            let found: Vec<&NestedBody> = body
                .blocks
                .iter()
                .filter(|b| b.type_name == *type_name)
                .collect();
            let path = join_path(prefix, type_name);

            if found.len() < nested.min_items {
                diags.push(schema_error(
                    subject,
                    &path,
                    format!(
                        "at least {} \"{}\" block(s) required, found {}",
                        nested.min_items,
                        type_name,
                        found.len()
                    ),
                ));
            }
            if nested.max_items > 0 && found.len() > nested.max_items {
                diags.push(schema_error(
                    subject,
                    &path,
                    format!(
                        "no more than {} \"{}\" block(s) allowed, found {}",
                        nested.max_items,
                        type_name,
                        found.len()
                    ),
                ));
            }

            for (i, block) in found.iter().enumerate() {
                let nested_prefix = format!("{}[{}]", path, i);
                nested
                    .block
                    .validate_at(&block.body, values, scope, subject, &nested_prefix, diags);
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn schema_error(subject: &str, path: &str, reason: impl ToString) -> Diagnostic {
    EvalError::SchemaValidation {
        subject: subject.to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Evaluate a body into a map value for plugin-side validation.
///
/// Attributes that fail to evaluate become unknown; the schema pass has
/// already reported them. Nested blocks appear as a list of maps under
/// their type name.
pub fn body_value(body: &Body, values: &KnownValues, scope: EvalScope) -> Value {
    let mut map: IndexMap<String, Value> = body
        .attributes
        .iter()
        .map(|(name, expr)| {
            let value = expr.evaluate(values, scope).unwrap_or(Value::Unknown);
            (name.clone(), value)
        })
        .collect();

    for nested in &body.blocks {
        let entry = map
            .entry(nested.type_name.clone())
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(items) = entry {
            items.push(body_value(&nested.body, values, scope));
        }
    }

    Value::Map(map)
}

/// Schema of the `connection` block accepted by every provisioner.
pub fn connection_schema() -> &'static Block {
    static SCHEMA: OnceLock<Block> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let string = || Attribute::optional(AttributeType::String);
        let number = || Attribute::optional(AttributeType::Number);
        let boolean = || Attribute::optional(AttributeType::Bool);
        Block::new()
            .with_attribute("type", string().describe("ssh or winrm"))
            .with_attribute("user", string())
            .with_attribute("password", string())
            .with_attribute("host", string())
            .with_attribute("port", number())
            .with_attribute("timeout", string())
            .with_attribute("script_path", string())
            .with_attribute("private_key", string())
            .with_attribute("certificate", string())
            .with_attribute("host_key", string())
            .with_attribute("agent", boolean())
            .with_attribute("agent_identity", string())
            .with_attribute("bastion_host", string())
            .with_attribute("bastion_host_key", string())
            .with_attribute("bastion_port", number())
            .with_attribute("bastion_user", string())
            .with_attribute("bastion_password", string())
            .with_attribute("bastion_private_key", string())
            .with_attribute("bastion_certificate", string())
            .with_attribute("https", boolean())
            .with_attribute("insecure", boolean())
            .with_attribute("use_ntlm", boolean())
            .with_attribute("cacert", string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::{Expr, Reference};

    fn instance_schema() -> Block {
        Block::new()
            .with_attribute("ami", Attribute::required(AttributeType::String))
            .with_attribute("count_hint", Attribute::optional(AttributeType::Number))
            .with_attribute("id", Attribute::computed(AttributeType::String))
            .with_attribute(
                "security_groups",
                Attribute::optional(AttributeType::List(Box::new(AttributeType::String)))
                    .deprecated("use vpc_security_group_ids"),
            )
            .with_block(
                "root_block_device",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("volume_size", Attribute::required(AttributeType::Number)),
                ),
            )
    }

    fn validate(body: &Body) -> Diagnostics {
        instance_schema().validate(
            body,
            &KnownValues::new(),
            EvalScope::default(),
            "aws_instance.web",
        )
    }

    #[test]
    fn test_valid_body() {
        let body = Body::new()
            .with_attribute("ami", Expr::literal("ami-123"))
            .with_block(
                "root_block_device",
                Body::new().with_attribute("volume_size", Expr::literal(20i64)),
            );
        assert!(validate(&body).is_empty());
    }

    #[test]
    fn test_collects_every_violation() {
        let body = Body::new()
            .with_attribute("count_hint", Expr::literal("many"))
            .with_attribute("id", Expr::literal("i-1"))
            .with_attribute("bogus", Expr::literal(true))
            .with_block("root_block_device", Body::new())
            .with_block("root_block_device", Body::new());

        let diags = validate(&body);
        let summaries: Vec<String> = diags.errors().map(|d| d.summary.clone()).collect();

        // type mismatch, computed-only, unsupported, missing ami,
        // too many blocks, missing volume_size in each block
        assert_eq!(summaries.len(), 7, "{:#?}", summaries);
        assert!(summaries[0].contains("count_hint"));
        assert!(summaries[1].contains("computed"));
        assert!(summaries[2].contains("bogus"));
        assert!(summaries[3].contains("\"ami\" is required"));
        assert!(diags.iter().all(|d| d.kind == ErrorKind::SchemaValidation));
        assert!(!diags.has_fatal());
    }

    #[test]
    fn test_deprecated_is_a_warning() {
        let body = Body::new()
            .with_attribute("ami", Expr::literal("ami-123"))
            .with_attribute(
                "security_groups",
                Expr::List(vec![Expr::literal("default")]),
            );
        let diags = validate(&body);
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);
    }

    #[test]
    fn test_unknown_values_conform() {
        let body = Body::new().with_attribute(
            "ami",
            Expr::Reference(Reference::parse("data.aws_ami.ubuntu.id").unwrap()),
        );
        assert!(validate(&body).is_empty());
    }

    #[test]
    fn test_body_value() {
        let body = Body::new()
            .with_attribute("command", Expr::literal("echo hi"))
            .with_attribute("missing", Expr::Reference(Reference::Variable("nope".into())))
            .with_block("tag", Body::new().with_attribute("key", Expr::literal("a")));

        let value = body_value(&body, &KnownValues::new(), EvalScope::default());
        let map = value.as_map().unwrap();
        assert_eq!(map["command"], Value::from("echo hi"));
        assert_eq!(map["missing"], Value::Unknown);
        assert_eq!(map["tag"].as_list().unwrap().len(), 1);
    }

    #[test]
    fn test_connection_schema() {
        let body = Body::new()
            .with_attribute("host", Expr::literal("10.0.0.1"))
            .with_attribute("port", Expr::literal(22i64))
            .with_attribute("agent", Expr::literal("yes please"));
        let diags = connection_schema().validate(
            &body,
            &KnownValues::new(),
            EvalScope::default(),
            "null_resource.x",
        );
        assert_eq!(diags.errors().count(), 1);
    }
}
