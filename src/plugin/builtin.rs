//! Built-in provisioners.
//!
//! These ship with the engine and need no plugin host: `local-exec`,
//! `remote-exec` and `file`.

use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::{ErrorKind, ResolutionError};
use crate::core::types::{AttributeType, Value};
use crate::plugin::provider::ResourceProvisioner;
use crate::plugin::registry::ProvisionerRegistry;
use crate::plugin::schema::{Attribute, Block};
use std::sync::Arc;

/// Register all built-in provisioners.
pub fn register_all(registry: &mut ProvisionerRegistry) {
    registry.register("local-exec", || Arc::new(LocalExec) as Arc<dyn ResourceProvisioner>);
    registry.register("remote-exec", || Arc::new(RemoteExec) as Arc<dyn ResourceProvisioner>);
    registry.register("file", || Arc::new(FileProvisioner) as Arc<dyn ResourceProvisioner>);
}

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

/// Names of the given keys that are set to something other than null.
fn set_keys<'a>(config: &Value, keys: &[&'a str]) -> Vec<&'a str> {
    let Some(map) = config.as_map() else {
        return Vec::new();
    };
    keys.iter()
        .copied()
        .filter(|k| map.get(*k).is_some_and(|v| !v.is_null()))
        .collect()
}

fn exactly_one_of(provisioner: &str, config: &Value, keys: &[&str]) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let set = set_keys(config, keys);
    match set.len() {
        1 => {}
        0 => diags.push(Diagnostic::error(
            ErrorKind::SchemaValidation,
            format!("{}: one of {} must be set", provisioner, keys.join(", ")),
        )),
        _ => diags.push(Diagnostic::error(
            ErrorKind::SchemaValidation,
            format!(
                "{}: only one of {} may be set, found {}",
                provisioner,
                keys.join(", "),
                set.join(", ")
            ),
        )),
    }
    diags
}

/// Runs a command on the machine running the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExec;

impl ResourceProvisioner for LocalExec {
    fn name(&self) -> &str {
        "local-exec"
    }

    fn schema(&self) -> Result<Block, ResolutionError> {
        Ok(Block::new()
            .with_attribute("command", Attribute::required(AttributeType::String))
            .with_attribute("working_dir", Attribute::optional(AttributeType::String))
            .with_attribute("interpreter", Attribute::optional(string_list()))
            .with_attribute(
                "environment",
                Attribute::optional(AttributeType::Map(Box::new(AttributeType::String))),
            ))
    }

    fn validate_config(&self, config: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let command = config.as_map().and_then(|m| m.get("command"));
        if let Some(Value::String(command)) = command {
            if command.trim().is_empty() {
                diags.error(ErrorKind::SchemaValidation, "local-exec: command must not be empty");
            }
        }
        diags
    }
}

/// Runs commands on the created resource over a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteExec;

impl ResourceProvisioner for RemoteExec {
    fn name(&self) -> &str {
        "remote-exec"
    }

    fn schema(&self) -> Result<Block, ResolutionError> {
        Ok(Block::new()
            .with_attribute("inline", Attribute::optional(string_list()))
            .with_attribute("script", Attribute::optional(AttributeType::String))
            .with_attribute("scripts", Attribute::optional(string_list())))
    }

    fn validate_config(&self, config: &Value) -> Diagnostics {
        exactly_one_of("remote-exec", config, &["inline", "script", "scripts"])
    }
}

/// Copies a file or inline content onto the created resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileProvisioner;

impl ResourceProvisioner for FileProvisioner {
    fn name(&self) -> &str {
        "file"
    }

    fn schema(&self) -> Result<Block, ResolutionError> {
        Ok(Block::new()
            .with_attribute("source", Attribute::optional(AttributeType::String))
            .with_attribute("content", Attribute::optional(AttributeType::String))
            .with_attribute("destination", Attribute::required(AttributeType::String)))
    }

    fn validate_config(&self, config: &Value) -> Diagnostics {
        exactly_one_of("file", config, &["source", "content"])
    }
}
