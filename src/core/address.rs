//! Resource, instance and provider addresses.
//!
//! Addresses identify graph vertices. A resource address names a
//! declaration; an instance address adds the key that distinguishes one
//! expanded instance from its siblings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Whether a resource is managed or only read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Created, updated and destroyed by the engine
    #[default]
    Managed,
    /// Read-only data source
    Data,
}

/// Address of a declared resource, e.g. `aws_instance.web`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAddress {
    /// Managed resource or data source
    #[serde(default)]
    pub mode: ResourceMode,
    /// Resource type, e.g. `aws_instance`
    pub type_name: String,
    /// Local name, e.g. `web`
    pub name: String,
}

impl ResourceAddress {
    /// Create a managed resource address.
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Create a data resource address.
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Address of one instance of this resource.
    pub fn instance(&self, key: InstanceKey) -> ResourceInstanceAddress {
        ResourceInstanceAddress {
            resource: self.clone(),
            key,
        }
    }

    /// The provider implied by the resource type: the prefix before the
    /// first underscore (`aws_instance` -> `aws`).
    pub fn implied_provider(&self) -> ProviderRef {
        let type_name = self
            .type_name
            .split('_')
            .next()
            .unwrap_or(&self.type_name);
        ProviderRef::new(type_name)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// Key distinguishing instances of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceKey {
    /// The resource declares no count
    NoKey,
    /// Position in `0..count`
    Int(usize),
}

impl InstanceKey {
    /// Integer index, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            InstanceKey::NoKey => None,
            InstanceKey::Int(i) => Some(*i),
        }
    }
}

/// Address of one expanded instance, e.g. `aws_instance.web[2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceInstanceAddress {
    /// The declaring resource
    pub resource: ResourceAddress,
    /// Instance key
    pub key: InstanceKey,
}

impl fmt::Display for ResourceInstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            InstanceKey::NoKey => write!(f, "{}", self.resource),
            InstanceKey::Int(i) => write!(f, "{}[{}]", self.resource, i),
        }
    }
}

/// A target restricting which addresses a walk considers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// Every instance of a resource
    Resource(ResourceAddress),
    /// Exactly one instance
    Instance(ResourceInstanceAddress),
}

impl Target {
    /// Whether an instance address is selected by this target.
    pub fn matches_instance(&self, addr: &ResourceInstanceAddress) -> bool {
        match self {
            Target::Resource(resource) => *resource == addr.resource,
            Target::Instance(instance) => instance == addr,
        }
    }

    /// Whether a resource declaration is selected by this target.
    ///
    /// An instance target selects its resource, since the declaration must
    /// be evaluated for the instance to exist.
    pub fn matches_resource(&self, addr: &ResourceAddress) -> bool {
        match self {
            Target::Resource(resource) => resource == addr,
            Target::Instance(instance) => instance.resource == *addr,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Resource(addr) => write!(f, "{}", addr),
            Target::Instance(addr) => write!(f, "{}", addr),
        }
    }
}

/// Reference to a configured provider, e.g. `provider.aws.east`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    /// Provider type, e.g. `aws`
    pub type_name: String,
    /// Optional alias for multiple configurations of one provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Acceptable provider versions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<semver::VersionReq>,
}

impl ProviderRef {
    /// Create a reference to the default configuration of a provider.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            alias: None,
            version: None,
        }
    }

    /// Set the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the version requirement.
    pub fn with_version(mut self, version: semver::VersionReq) -> Self {
        self.version = Some(version);
        self
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "provider.{}.{}", self.type_name, alias),
            None => write!(f, "provider.{}", self.type_name),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Failure to parse an address string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid address '{input}': {reason}")]
pub struct AddressParseError {
    /// The rejected input
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

impl AddressParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split a trailing `[n]` index off an address string.
fn split_index(s: &str) -> Result<(&str, Option<usize>), AddressParseError> {
    match s.strip_suffix(']') {
        Some(rest) => {
            let open = rest
                .rfind('[')
                .ok_or_else(|| AddressParseError::new(s, "unbalanced brackets"))?;
            let index = rest[open + 1..]
                .parse::<usize>()
                .map_err(|_| {
                    AddressParseError::new(s, "instance key must be a non-negative integer")
                })?;
            Ok((&rest[..open], Some(index)))
        }
        None => Ok((s, None)),
    }
}

impl FromStr for ResourceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let (mode, type_name, name) = match parts.as_slice() {
            ["data", type_name, name] => (ResourceMode::Data, *type_name, *name),
            [type_name, name] => (ResourceMode::Managed, *type_name, *name),
            _ => return Err(AddressParseError::new(s, "expected [data.]TYPE.NAME")),
        };
        if !is_identifier(type_name) || !is_identifier(name) {
            return Err(AddressParseError::new(s, "type and name must be identifiers"));
        }
        Ok(Self {
            mode,
            type_name: type_name.to_string(),
            name: name.to_string(),
        })
    }
}

impl FromStr for ResourceInstanceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, index) = split_index(s)?;
        let resource: ResourceAddress = resource.parse().map_err(|_| {
            AddressParseError::new(s, "expected [data.]TYPE.NAME[INDEX]")
        })?;
        let key = index.map_or(InstanceKey::NoKey, InstanceKey::Int);
        Ok(resource.instance(key))
    }
}

impl FromStr for Target {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, index) = split_index(s)?;
        if index.is_some() {
            Ok(Target::Instance(s.parse()?))
        } else {
            Ok(Target::Resource(s.parse()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = ResourceAddress::managed("aws_instance", "web");
        assert_eq!(addr.to_string(), "aws_instance.web");
        assert_eq!(addr.instance(InstanceKey::Int(2)).to_string(), "aws_instance.web[2]");
        assert_eq!(addr.instance(InstanceKey::NoKey).to_string(), "aws_instance.web");
        assert_eq!(ResourceAddress::data("aws_ami", "ubuntu").to_string(), "data.aws_ami.ubuntu");
    }

    #[test]
    fn test_parse_roundtrip() {
        for input in ["aws_instance.web", "data.aws_ami.ubuntu", "null_resource.x[3]"] {
            let target: Target = input.parse().unwrap();
            assert_eq!(target.to_string(), input);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!("aws_instance".parse::<ResourceAddress>().is_err());
        assert!("aws_instance.web[-1]".parse::<ResourceInstanceAddress>().is_err());
        assert!("aws_instance.web[1".parse::<Target>().is_err());
        assert!("1abc.web".parse::<ResourceAddress>().is_err());
    }

    #[test]
    fn test_target_matching() {
        let web = ResourceAddress::managed("aws_instance", "web");
        let db = ResourceAddress::managed("aws_instance", "db");

        let whole = Target::Resource(web.clone());
        assert!(whole.matches_instance(&web.instance(InstanceKey::Int(0))));
        assert!(whole.matches_instance(&web.instance(InstanceKey::Int(7))));
        assert!(!whole.matches_instance(&db.instance(InstanceKey::Int(0))));

        let one = Target::Instance(web.instance(InstanceKey::Int(1)));
        assert!(one.matches_instance(&web.instance(InstanceKey::Int(1))));
        assert!(!one.matches_instance(&web.instance(InstanceKey::Int(0))));
        assert!(one.matches_resource(&web));
        assert!(!one.matches_resource(&db));
    }

    #[test]
    fn test_implied_provider() {
        let addr = ResourceAddress::managed("google_compute_instance", "vm");
        assert_eq!(addr.implied_provider().to_string(), "provider.google");

        let aliased = ProviderRef::new("aws").with_alias("east");
        assert_eq!(aliased.to_string(), "provider.aws.east");
    }
}
