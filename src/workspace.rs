//! Loading configurations from workspace files.
//!
//! A workspace is one or more `.json` or `.toml` files. Each may declare
//! input variables, provider and provisioner schemas, resources and
//! previously recorded state; the loader merges them in file order.
//!
//! Paths may name a file, a directory (scanned recursively) or a glob
//! pattern.

use crate::core::address::{ProviderRef, ResourceInstanceAddress, ResourceMode};
use crate::core::config::{Body, OnFailure, ProvisionerConfig, ProvisionerWhen, ResourceConfig};
use crate::core::expr::{Expr, KnownValues, Reference};
use crate::core::types::Value;
use crate::eval::context::EvalContext;
use crate::plugin::provider::{ProviderResolver, ProviderSchema, ProvisionerResolver};
use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
use crate::plugin::schema::Block;
use crate::state::{InstanceState, SharedState, State};
use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors from loading a workspace.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// A file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A `.json` file failed to parse
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A `.toml` file failed to parse
    #[error("Invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Neither `.json` nor `.toml`
    #[error("Unsupported file type: {} (expected .json or .toml)", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A malformed glob pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// A directory or pattern matched nothing
    #[error("No workspace files found in {0}")]
    NoFiles(String),

    /// Well-formed but semantically wrong content
    #[error("Invalid workspace {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl WorkspaceError {
    fn invalid(path: &Path, reason: impl fmt::Display) -> Self {
        WorkspaceError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for workspace loading.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFile {
    variables: IndexMap<String, Value>,
    providers: Vec<RawProvider>,
    provisioners: Vec<RawProvisionerSchema>,
    resources: Vec<RawResource>,
    state: Vec<RawState>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    config: Block,
    #[serde(default)]
    resources: IndexMap<String, Block>,
    #[serde(default)]
    data_sources: IndexMap<String, Block>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

#[derive(Debug, Deserialize)]
struct RawProvisionerSchema {
    name: String,
    #[serde(default)]
    schema: Block,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBody {
    config: IndexMap<String, Value>,
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(flatten)]
    body: RawBody,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    mode: ResourceMode,
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    #[serde(default)]
    count: Option<Value>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    provider_version: Option<String>,
    #[serde(flatten)]
    body: RawBody,
    #[serde(default)]
    provisioners: Vec<RawProvisioner>,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawProvisioner {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(flatten)]
    body: RawBody,
    #[serde(default)]
    connection: Option<IndexMap<String, Value>>,
    #[serde(default)]
    when: ProvisionerWhen,
    #[serde(default)]
    on_failure: OnFailure,
}

#[derive(Debug, Deserialize)]
struct RawState {
    address: String,
    id: String,
    #[serde(default)]
    attributes: IndexMap<String, Value>,
}

// ============================================================================
// Workspace
// ============================================================================

/// A loaded workspace: everything a validation walk needs.
pub struct Workspace {
    /// Files read, in load order
    pub files: Vec<PathBuf>,
    /// Declared resources, in declaration order
    pub resources: Vec<Arc<ResourceConfig>>,
    /// Input variable values
    pub values: KnownValues,
    /// Recorded state
    pub state: SharedState,
    providers: Arc<ProviderRegistry>,
    provisioners: Arc<ProvisionerRegistry>,
}

impl Workspace {
    /// Load and merge every workspace file the paths name.
    pub fn load<S: AsRef<str>>(paths: &[S]) -> WorkspaceResult<Self> {
        let mut files = Vec::new();
        for path in paths {
            files.extend(discover(path.as_ref())?);
        }

        let mut loader = Loader::default();
        for file in &files {
            loader.load_file(file)?;
        }
        info!(
            "loaded {} resource(s) from {} file(s)",
            loader.resources.len(),
            files.len()
        );

        Ok(Self {
            files,
            resources: loader.resources,
            values: loader.values,
            state: loader.state.into_shared(),
            providers: Arc::new(loader.providers),
            provisioners: Arc::new(loader.provisioners),
        })
    }

    /// Parse a single document held in memory.
    pub fn from_source(source: &str, format: Format) -> WorkspaceResult<Self> {
        let path = PathBuf::from(format!("<inline>.{}", format.extension()));
        let mut loader = Loader::default();
        loader.merge(&path, parse(&path, source, format)?)?;
        Ok(Self {
            files: Vec::new(),
            resources: loader.resources,
            values: loader.values,
            state: loader.state.into_shared(),
            providers: Arc::new(loader.providers),
            provisioners: Arc::new(loader.provisioners),
        })
    }

    /// Registered providers.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Registered provisioners, built-ins included.
    pub fn provisioners(&self) -> &ProvisionerRegistry {
        &self.provisioners
    }

    /// Build an evaluation context over this workspace.
    pub fn context(&self) -> EvalContext {
        let providers: Arc<dyn ProviderResolver> = self.providers.clone();
        let provisioners: Arc<dyn ProvisionerResolver> = self.provisioners.clone();
        EvalContext::new(providers, provisioners)
            .with_state(Arc::clone(&self.state))
            .with_values(self.values.clone())
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("files", &self.files)
            .field("resources", &self.resources.len())
            .field("providers", &self.providers.len())
            .field("provisioners", &self.provisioners.len())
            .finish()
    }
}

/// Workspace file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.json`
    Json,
    /// `.toml`
    Toml,
}

impl Format {
    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Format::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Some(Format::Toml),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Toml => "toml",
        }
    }
}

fn is_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Expand one command-line path into workspace files.
fn discover(path: &str) -> WorkspaceResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = if is_pattern(path) {
        let entries = glob::glob(path).map_err(|e| WorkspaceError::Pattern {
            pattern: path.to_string(),
            reason: e.to_string(),
        })?;
        entries
            .filter_map(|e| e.ok())
            .filter(|p| p.is_file() && Format::from_path(p).is_some())
            .collect()
    } else {
        let root = Path::new(path);
        if root.is_dir() {
            walkdir::WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| Format::from_path(p).is_some())
                .collect()
        } else {
            if Format::from_path(root).is_none() {
                return Err(WorkspaceError::UnsupportedFormat(root.to_path_buf()));
            }
            return Ok(vec![root.to_path_buf()]);
        }
    };

    if files.is_empty() {
        return Err(WorkspaceError::NoFiles(path.to_string()));
    }
    files.sort();
    debug!("{} matched {} file(s)", path, files.len());
    Ok(files)
}

fn parse(path: &Path, source: &str, format: Format) -> WorkspaceResult<RawFile> {
    match format {
        Format::Json => serde_json::from_str(source).map_err(|source| WorkspaceError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Format::Toml => toml::from_str(source).map_err(|source| WorkspaceError::Toml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Accumulates files into one workspace.
struct Loader {
    resources: Vec<Arc<ResourceConfig>>,
    values: KnownValues,
    state: State,
    providers: ProviderRegistry,
    provisioners: ProvisionerRegistry,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            values: KnownValues::new(),
            state: State::new(),
            providers: ProviderRegistry::new(),
            provisioners: ProvisionerRegistry::with_builtins(),
        }
    }
}

impl Loader {
    fn load_file(&mut self, path: &Path) -> WorkspaceResult<()> {
        let format = Format::from_path(path)
            .ok_or_else(|| WorkspaceError::UnsupportedFormat(path.to_path_buf()))?;
        let source = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loading {}", path.display());
        let raw = parse(path, &source, format)?;
        self.merge(path, raw)
    }

    fn merge(&mut self, path: &Path, raw: RawFile) -> WorkspaceResult<()> {
        self.values.variables.extend(raw.variables);

        for provider in raw.providers {
            let version = semver::Version::parse(&provider.version).map_err(|e| {
                WorkspaceError::invalid(path, format!("provider {}: {}", provider.name, e))
            })?;
            let schema = ProviderSchema {
                provider: provider.config,
                resource_types: provider.resources,
                data_sources: provider.data_sources,
            };
            self.providers.register_schema(provider.name.clone(), version, schema);
            for alias in provider.aliases {
                self.providers.configure_alias(&provider.name, alias);
            }
        }

        for provisioner in raw.provisioners {
            self.provisioners.register_schema(provisioner.name, provisioner.schema);
        }

        for resource in raw.resources {
            let config = resource_config(resource)
                .map_err(|reason| WorkspaceError::invalid(path, reason))?;
            self.resources.push(Arc::new(config));
        }

        for entry in raw.state {
            let address: ResourceInstanceAddress = entry
                .address
                .parse()
                .map_err(|e| WorkspaceError::invalid(path, e))?;
            let mut instance = InstanceState::new(entry.id);
            instance.attributes = entry.attributes;
            self.state.insert(address, instance);
        }
        Ok(())
    }
}

fn body(raw: RawBody) -> Result<Body, String> {
    let mut body = Body::new();
    for (name, value) in raw.config {
        let expr = Expr::from_value(value).map_err(|e| format!("{}: {}", name, e))?;
        body = body.with_attribute(name, expr);
    }
    for block in raw.blocks {
        body = body.with_block(block.type_name, self::body(block.body)?);
    }
    Ok(body)
}

fn resource_config(raw: RawResource) -> Result<ResourceConfig, String> {
    let mut config = ResourceConfig::managed(raw.type_name, raw.name);
    config.mode = raw.mode;
    let addr = config.address();
    let context = |e: &dyn fmt::Display| format!("{}: {}", addr, e);

    if let Some(count) = raw.count {
        config.count = Some(Expr::from_value(count).map_err(|e| context(&e))?);
    }

    let mut provider = raw.provider.map(|p| match p.split_once('.') {
        Some((type_name, alias)) => ProviderRef::new(type_name).with_alias(alias),
        None => ProviderRef::new(p),
    });
    if let Some(version) = raw.provider_version {
        let req = semver::VersionReq::parse(&version).map_err(|e| context(&e))?;
        provider = Some(provider.unwrap_or_else(|| addr.implied_provider()).with_version(req));
    }
    config.provider = provider;

    config.body = body(raw.body).map_err(|e| context(&e))?;

    for reference in raw.depends_on {
        config
            .depends_on
            .push(Reference::parse(&reference).map_err(|e| context(&e))?);
    }

    for provisioner in raw.provisioners {
        let mut p = ProvisionerConfig::new(provisioner.type_name)
            .with_body(body(provisioner.body).map_err(|e| context(&e))?);
        if let Some(connection) = provisioner.connection {
            let connection = body(RawBody {
                config: connection,
                blocks: Vec::new(),
            })
            .map_err(|e| context(&e))?;
            p = p.with_connection(connection);
        }
        p.when = provisioner.when;
        p.on_failure = provisioner.on_failure;
        config.provisioners.push(p);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::InstanceKey;
    use crate::walk::Walker;
    use std::fs;

    const NETWORK: &str = r#"
    {
      "variables": { "replicas": 2 },
      "providers": [
        {
          "name": "aws",
          "version": "5.1.0",
          "aliases": ["east"],
          "resources": {
            "aws_vpc": { "attributes": { "cidr_block": { "type": "string", "required": true } } },
            "aws_instance": {
              "attributes": {
                "ami": { "type": "string", "required": true },
                "vpc_id": { "type": "string", "optional": true }
              }
            }
          }
        }
      ],
      "resources": [
        { "type": "aws_vpc", "name": "main", "config": { "cidr_block": "10.0.0.0/16" } }
      ]
    }
    "#;

    const COMPUTE: &str = r#"
    [[resources]]
    type = "aws_instance"
    name = "web"
    count = "${var.replicas}"
    provider = "aws.east"
    provider_version = ">=5"
    config = { ami = "ami-123", vpc_id = "${aws_vpc.main.id}" }

    [[resources.provisioners]]
    type = "local-exec"
    config = { command = "echo ${count.index}" }

    [[state]]
    address = "aws_instance.web[0]"
    id = "i-0abc"
    "#;

    #[test]
    fn test_load_directory_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("network.json"), NETWORK).unwrap();
        fs::write(dir.path().join("compute.toml"), COMPUTE).unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let workspace = Workspace::load(&[dir.path().to_str().unwrap()]).unwrap();
        assert_eq!(workspace.files.len(), 2);
        assert_eq!(workspace.resources.len(), 2);
        assert!(workspace.providers().contains("aws"));

        let web = workspace
            .resources
            .iter()
            .find(|r| r.name == "web")
            .unwrap();
        let provider = web.provider_ref();
        assert_eq!(provider.alias.as_deref(), Some("east"));
        assert!(provider.version.is_some());
        assert_eq!(web.provisioners.len(), 1);

        let addr = web.address().instance(InstanceKey::Int(0));
        assert_eq!(workspace.state.read().get(&addr).unwrap().id, "i-0abc");

        let report = Walker::new(workspace.context()).validate(&workspace.resources);
        assert!(report.is_success(), "{:?}", report.diagnostics);
        assert_eq!(report.instances.get("aws_instance.web"), Some(&2));
    }

    #[test]
    fn test_glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), NETWORK).unwrap();
        fs::write(dir.path().join("b.toml"), COMPUTE).unwrap();

        let pattern = format!("{}/*.json", dir.path().display());
        let workspace = Workspace::load(&[pattern]).unwrap();
        assert_eq!(workspace.resources.len(), 1);
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let empty = format!("{}/*.json", dir.path().display());
        assert!(matches!(Workspace::load(&[empty]), Err(WorkspaceError::NoFiles(_))));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            Workspace::load(&[bad.to_str().unwrap()]),
            Err(WorkspaceError::Json { .. })
        ));

        let yaml = dir.path().join("x.yaml");
        fs::write(&yaml, "a: 1").unwrap();
        assert!(matches!(
            Workspace::load(&[yaml.to_str().unwrap()]),
            Err(WorkspaceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_reference() {
        let source =
            r#"{ "resources": [ { "type": "a_b", "name": "c", "depends_on": ["nonsense"] } ] }"#;
        let err = Workspace::from_source(source, Format::Json).unwrap_err();
        assert!(err.to_string().contains("a_b.c"));
    }

    #[test]
    fn test_custom_provisioner_schema() {
        let source = r#"
        [[provisioners]]
        name = "chef"
        schema = { attributes = { run_list = { type = { list = "string" }, required = true } } }
        "#;
        let workspace = Workspace::from_source(source, Format::Toml).unwrap();
        assert!(workspace.provisioners().contains("chef"));
        assert!(workspace.provisioners().contains("local-exec"));
    }
}
