//! Node descriptors.
//!
//! A node is a logical unit of work: a configuration, a worker program, and
//! a declared set of operations that become broadcast proxies once the node
//! is clustered.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::store::{ConfigBlock, NodeConfig};

/// A named operation a node exposes to its workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    /// Number of arguments, when the operation declares one.
    pub arity: Option<usize>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
        }
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }
}

/// The operations a node declares, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    operations: Vec<Operation>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an operation. A later declaration with the same name replaces the earlier one.
    pub fn with(mut self, operation: Operation) -> Self {
        self.operations.retain(|op| op.name != operation.name);
        self.operations.push(operation);
        self
    }

    pub fn operation(self, name: impl Into<String>) -> Self {
        self.with(Operation::new(name))
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Something the supervisor can cluster.
pub trait Node: Send + Sync {
    /// Type name; lower-cased it is the fallback node id.
    fn type_name(&self) -> &str;

    fn config(&self) -> &NodeConfig;

    /// Program each worker runs.
    fn filename(&self) -> &Path;

    /// Arguments passed to the worker program.
    fn args(&self) -> &[String] {
        &[]
    }

    fn capabilities(&self) -> Capabilities;

    /// The node's own fields, merged into an already registered entry.
    fn fields(&self) -> ConfigBlock {
        ConfigBlock::new()
    }
}

/// Node id: `config.provided.id` when present, else the lower-cased type name.
pub fn resolve_id(node: &dyn Node) -> String {
    match node.config().provided_id() {
        Some(id) => id.to_string(),
        None => node.type_name().to_lowercase(),
    }
}

/// Key a hook is registered under.
///
/// Strings are taken verbatim. [`NodeKey::of`] derives the key from a
/// node's type name only; an explicit `provided.id` is not consulted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn of(node: &dyn Node) -> Self {
        NodeKey(node.type_name().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeKey {
    fn from(id: &str) -> Self {
        NodeKey(id.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(id: String) -> Self {
        NodeKey(id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A plain data node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    type_name: String,
    config: NodeConfig,
    filename: PathBuf,
    args: Vec<String>,
    capabilities: Capabilities,
    fields: ConfigBlock,
}

impl NodeSpec {
    pub fn new(type_name: impl Into<String>, filename: impl AsRef<Path>) -> Self {
        Self {
            type_name: type_name.into(),
            config: NodeConfig::default(),
            filename: filename.as_ref().to_path_buf(),
            args: Vec::new(),
            capabilities: Capabilities::new(),
            fields: ConfigBlock::new(),
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.capabilities = self.capabilities.operation(name);
        self
    }

    pub fn with_operation_arity(mut self, name: impl Into<String>, arity: usize) -> Self {
        self.capabilities = self.capabilities.with(Operation::new(name).with_arity(arity));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Node for NodeSpec {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn filename(&self) -> &Path {
        &self.filename
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn fields(&self) -> ConfigBlock {
        self.fields.clone()
    }
}
