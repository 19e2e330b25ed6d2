//! Per-node configuration blocks and deep merge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node's merged configuration.
pub type ConfigBlock = serde_json::Map<String, Value>;

/// Configuration a node hands to the supervisor.
///
/// `local` holds the node's defaults, `provided` the caller's overrides.
/// Either may be absent; absence behaves as an empty map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<ConfigBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided: Option<ConfigBlock>,
}

impl NodeConfig {
    pub fn new(local: Option<ConfigBlock>, provided: Option<ConfigBlock>) -> Self {
        Self { local, provided }
    }

    /// Build from two JSON values; anything that is not a JSON object is ignored.
    pub fn from_json(local: Value, provided: Value) -> Self {
        Self {
            local: into_block(local),
            provided: into_block(provided),
        }
    }

    /// Explicit node id from `provided.id`, if it is a string.
    pub fn provided_id(&self) -> Option<&str> {
        self.provided
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
    }

    /// `deep_merge(local, provided)`.
    pub fn merged(&self) -> ConfigBlock {
        let empty = ConfigBlock::new();
        deep_merge(
            self.local.as_ref().unwrap_or(&empty),
            self.provided.as_ref().unwrap_or(&empty),
        )
    }
}

/// Turn a JSON value into a block if it is an object.
pub fn into_block(value: Value) -> Option<ConfigBlock> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Merge `overrides` on top of `base`.
///
/// Keys only in `base` survive, conflicting keys take the override, nested
/// maps merge recursively, and every other value (arrays included) is
/// replaced wholesale.
pub fn deep_merge(base: &ConfigBlock, overrides: &ConfigBlock) -> ConfigBlock {
    let mut merged = base.clone();
    merge_into(&mut merged, overrides);
    merged
}

/// In-place variant of [`deep_merge`].
pub fn merge_into(target: &mut ConfigBlock, overrides: &ConfigBlock) {
    for (key, incoming) in overrides {
        if let (Some(Value::Object(existing)), Value::Object(nested)) =
            (target.get_mut(key), incoming)
        {
            merge_into(existing, nested);
            continue;
        }
        target.insert(key.clone(), incoming.clone());
    }
}
