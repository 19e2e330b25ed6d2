//! Shared supervisor state.
//!
//! A [`Context`] is a cheap handle to one `GlobalState`: per-node config
//! blocks, node entries (hooks, workers, proxies, fields), the id most
//! recently clustered, and the logging sink. Every component gets a clone.
//!
//! The lock is a `std::sync::RwLock` and is never held across an await.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use blitz_codec::{Array, Callback, CodecError, Object, Value};
use tracing::debug;

use crate::error::{Result, SupervisorError};
use crate::hooks::Hook;
use crate::logging::LogSink;
use crate::pool::{WorkerHandle, WorkerList};
use crate::protocol::WorkerMessage;
use crate::proxy::MethodProxy;
use crate::store::{into_block, merge_into, ConfigBlock, NodeConfig};

/// Everything registered under one node id.
#[derive(Debug, Default)]
struct NodeEntry {
    hooks: Vec<Hook>,
    workers: WorkerList,
    methods: BTreeMap<String, MethodProxy>,
    fields: ConfigBlock,
}

#[derive(Debug, Default)]
struct GlobalState {
    config: BTreeMap<String, ConfigBlock>,
    nodes: BTreeMap<String, NodeEntry>,
    /// Id of the node most recently clustered.
    id: Option<String>,
    /// Last snapshot received from a parent, on the worker side.
    hydrated: Option<Value>,
}

/// Handle to the shared state.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<GlobalState>>,
    log: LogSink,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// Whether both handles point at the same state.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -------------------------------------------------------------------------
    // Config
    // -------------------------------------------------------------------------

    /// Replace the block of `id` with `deep_merge(local, provided)`.
    pub fn set_config(&self, id: &str, config: &NodeConfig) {
        let merged = config.merged();
        debug!(node_id = %id, keys = merged.len(), "config published");
        self.write().config.insert(id.to_string(), merged);
    }

    pub fn config(&self, id: &str) -> Option<ConfigBlock> {
        self.read().config.get(id).cloned()
    }

    pub fn config_ids(&self) -> Vec<String> {
        self.read().config.keys().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    pub fn has_node(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    /// Register `id`. A repeat registration merges `fields` into the existing
    /// entry; a first one creates an empty entry.
    ///
    /// Returns whether the entry already existed.
    pub fn register_node(&self, id: &str, fields: &ConfigBlock) -> bool {
        let mut state = self.write();
        match state.nodes.get_mut(id) {
            Some(entry) => {
                merge_into(&mut entry.fields, fields);
                true
            }
            None => {
                state.nodes.insert(id.to_string(), NodeEntry::default());
                false
            }
        }
    }

    pub fn fields(&self, id: &str) -> Option<ConfigBlock> {
        self.read().nodes.get(id).map(|entry| entry.fields.clone())
    }

    pub(crate) fn add_hook(&self, id: &str, hook: Hook) {
        self.write()
            .nodes
            .entry(id.to_string())
            .or_default()
            .hooks
            .push(hook);
    }

    /// Hooks of `id` in insertion order.
    pub fn hooks(&self, id: &str) -> Result<Vec<Hook>> {
        self.read()
            .nodes
            .get(id)
            .map(|entry| entry.hooks.clone())
            .ok_or_else(|| SupervisorError::MissingNode(id.to_string()))
    }

    /// Worker list of `id`, creating the entry if needed.
    pub fn workers(&self, id: &str) -> WorkerList {
        self.write()
            .nodes
            .entry(id.to_string())
            .or_default()
            .workers
            .clone()
    }

    /// Empty the worker list of `id` in place and return it.
    ///
    /// Proxies and lineages holding the list keep seeing it.
    pub(crate) fn reset_workers(&self, id: &str) -> WorkerList {
        let workers = self.workers(id);
        workers.clear();
        workers
    }

    pub(crate) fn install_method(&self, id: &str, proxy: MethodProxy) {
        self.write()
            .nodes
            .entry(id.to_string())
            .or_default()
            .methods
            .insert(proxy.method().to_string(), proxy);
    }

    pub fn method(&self, id: &str, name: &str) -> Option<MethodProxy> {
        self.read()
            .nodes
            .get(id)
            .and_then(|entry| entry.methods.get(name))
            .cloned()
    }

    /// Names of the proxies installed for `id`.
    pub fn methods(&self, id: &str) -> Vec<String> {
        self.read()
            .nodes
            .get(id)
            .map(|entry| entry.methods.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_current_id(&self, id: &str) {
        self.write().id = Some(id.to_string());
    }

    pub fn current_id(&self) -> Option<String> {
        self.read().id.clone()
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// The whole state as a value graph.
    ///
    /// Each node entry is `{fields, methods, hooks, workers}`. Every worker
    /// object points back at its node entry, so the graph is cyclic as soon
    /// as a node has workers. Hooks and proxies appear as callbacks.
    pub fn snapshot(&self) -> Value {
        let state = self.read();
        let root = Object::new();

        root.insert("id", state.id.clone().map(Value::from).unwrap_or(Value::Null));

        let config = Object::new();
        for (id, block) in &state.config {
            config.insert(id.clone(), Value::from_json(&serde_json::Value::Object(block.clone())));
        }
        root.insert("config", config);

        let nodes = Object::new();
        for (id, entry) in &state.nodes {
            nodes.insert(id.clone(), entry_snapshot(entry));
        }
        root.insert("nodes", nodes);

        let log = Object::new();
        log.insert("scope", self.log.scope());
        root.insert("log", log);

        Value::Object(root)
    }

    /// A `setGlobal` message carrying the serialized snapshot.
    pub fn hydrate_message(&self) -> Result<WorkerMessage> {
        let data = blitz_codec::serialize(&self.snapshot())?;
        Ok(WorkerMessage::set_global(data))
    }

    /// Fold a snapshot received from a parent into this state.
    ///
    /// Config blocks are deep-merged and the current id is taken over. The
    /// snapshot itself is kept and available from [`Context::hydrated`].
    pub fn absorb_snapshot(&self, snapshot: &Value) -> std::result::Result<(), CodecError> {
        let root = snapshot
            .as_object()
            .ok_or_else(|| CodecError::Malformed("snapshot is not an object".to_string()))?;

        let mut blocks = Vec::new();
        if let Some(Value::Object(config)) = root.get("config") {
            for (id, block) in config.entries() {
                if let Some(block) = into_block(block.to_json()?) {
                    blocks.push((id, block));
                }
            }
        }
        let id = root.get("id").and_then(|v| v.as_str().map(str::to_string));

        let mut state = self.write();
        for (id, block) in &blocks {
            merge_into(state.config.entry(id.clone()).or_default(), block);
        }
        if id.is_some() {
            state.id = id;
        }
        state.hydrated = Some(snapshot.clone());
        Ok(())
    }

    pub fn hydrated(&self) -> Option<Value> {
        self.read().hydrated.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, GlobalState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GlobalState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `{fields, methods, hooks, workers}`. Fields and proxies sit in their own
/// maps so user-chosen names cannot shadow each other or the lists.
fn entry_snapshot(entry: &NodeEntry) -> Object {
    let object = Object::new();

    let fields = Object::new();
    for (key, value) in &entry.fields {
        fields.insert(key.clone(), Value::from_json(value));
    }
    object.insert("fields", fields);

    let methods = Object::new();
    for (name, proxy) in &entry.methods {
        methods.insert(name.clone(), proxy.to_callback());
    }
    object.insert("methods", methods);

    let hooks = Array::new();
    for hook in &entry.hooks {
        let hook = hook.clone();
        hooks.push(Callback::new(hook.label().to_string(), move |_| match hook.run() {
            Ok(()) => Value::Null,
            Err(e) => Value::String(e.to_string()),
        }));
    }
    object.insert("hooks", hooks);

    let workers = Array::new();
    for handle in entry.workers.handles() {
        workers.push(worker_snapshot(&handle, &object));
    }
    object.insert("workers", workers);

    object
}

fn worker_snapshot(handle: &WorkerHandle, node: &Object) -> Object {
    let worker = Object::new();
    worker.insert("id", handle.id().to_string());
    worker.insert("pid", handle.pid().map(Value::from).unwrap_or(Value::Null));
    worker.insert("state", handle.state().as_str());
    worker.insert("started_at", handle.started_at().to_rfc3339());
    worker.insert(
        "replaces",
        handle
            .replaces()
            .map(|id| Value::from(id.to_string()))
            .unwrap_or(Value::Null),
    );
    worker.insert("node", node.clone());
    worker
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn node_config(local: serde_json::Value, provided: serde_json::Value) -> NodeConfig {
        NodeConfig::from_json(local, provided)
    }

    #[test]
    fn test_set_config_replaces_block() {
        let ctx = Context::new();
        ctx.set_config("core", &node_config(json!({"a": 1, "b": 1}), json!({"b": 2})));
        assert_eq!(ctx.config("core"), into_block(json!({"a": 1, "b": 2})));

        ctx.set_config("core", &node_config(json!({"c": 3}), json!(null)));
        assert_eq!(ctx.config("core"), into_block(json!({"c": 3})));
    }

    #[test]
    fn test_fields_merge_only_on_repeat_registration() {
        let ctx = Context::new();
        let fields = into_block(json!({"port": 3000})).unwrap();

        assert!(!ctx.register_node("core", &fields));
        assert_eq!(ctx.fields("core"), Some(ConfigBlock::new()));

        assert!(ctx.register_node("core", &fields));
        assert_eq!(ctx.fields("core"), Some(fields));
    }

    #[test]
    fn test_missing_node_hooks() {
        let err = Context::new().hooks("core").unwrap_err();
        assert!(matches!(err, SupervisorError::MissingNode(id) if id == "core"));
    }

    #[test]
    fn test_snapshot_is_cyclic_and_serializable() {
        let ctx = Context::new();
        ctx.set_config("core", &node_config(json!({"port": 3000}), json!(null)));
        ctx.add_hook("core", Hook::named("prepare", || Ok(())));
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, _state) = WorkerHandle::new("core", Some(42), tx, None);
        ctx.workers("core").push(handle);
        ctx.set_current_id("core");

        let snapshot = ctx.snapshot();
        let entry = snapshot
            .as_object()
            .and_then(|root| root.get("nodes"))
            .and_then(|nodes| nodes.as_object().and_then(|n| n.get("core")))
            .unwrap();
        let entry = entry.as_object().unwrap();
        let worker = entry.get("workers").unwrap().as_array().unwrap().get(0).unwrap();
        let back = worker.as_object().unwrap().get("node").unwrap();
        assert!(back.as_object().unwrap().ptr_eq(entry));

        let text = blitz_codec::serialize(&snapshot).unwrap();
        assert!(text.contains("prepare"));
        assert!(text.contains("$ref"));
    }

    #[test]
    fn test_entry_names_do_not_collide() {
        let ctx = Context::new();
        let fields = into_block(json!({"hooks": "field", "workers": 7})).unwrap();
        ctx.register_node("core", &ConfigBlock::new());
        ctx.register_node("core", &fields);
        ctx.add_hook("core", Hook::named("prepare", || Ok(())));
        let workers = ctx.workers("core");
        ctx.install_method("core", MethodProxy::new("core", "workers", None, workers));

        let snapshot = ctx.snapshot();
        let entry = snapshot
            .as_object()
            .and_then(|root| root.get("nodes"))
            .and_then(|nodes| nodes.as_object().and_then(|n| n.get("core")))
            .unwrap();
        let entry = entry.as_object().unwrap();
        assert_eq!(entry.keys(), vec!["fields", "hooks", "methods", "workers"]);

        let fields = entry.get("fields").unwrap();
        let fields = fields.as_object().unwrap();
        assert_eq!(fields.get("hooks").unwrap().as_str(), Some("field"));
        assert_eq!(fields.get("workers").unwrap().as_i64(), Some(7));

        let methods = entry.get("methods").unwrap();
        let method = methods.as_object().unwrap().get("workers").unwrap();
        assert!(matches!(method, Value::Callback(_)));

        assert_eq!(entry.get("hooks").unwrap().as_array().unwrap().len(), 1);
        assert!(entry.get("workers").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn test_absorb_snapshot_merges_config() {
        let parent = Context::new();
        parent.set_config("core", &node_config(json!({"port": 3000, "db": {"host": "a"}}), json!(null)));
        parent.set_current_id("core");
        let WorkerMessage::SetGlobal { data } = parent.hydrate_message().unwrap() else {
            panic!("expected setGlobal");
        };

        let worker = Context::new();
        worker.set_config("core", &node_config(json!({"db": {"user": "w"}}), json!(null)));
        worker
            .absorb_snapshot(&blitz_codec::deserialize(&data).unwrap())
            .unwrap();

        assert_eq!(
            worker.config("core"),
            into_block(json!({"port": 3000, "db": {"host": "a", "user": "w"}}))
        );
        assert_eq!(worker.current_id().as_deref(), Some("core"));
        assert!(worker.hydrated().is_some());
    }

    #[test]
    fn test_absorb_rejects_non_object() {
        let err = Context::new().absorb_snapshot(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
