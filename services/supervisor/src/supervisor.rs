//! The supervisor: registration API over the shared state.

use std::sync::Arc;

use blitz_codec::Value;
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::hooks::{Hook, HookRegistry};
use crate::node::{resolve_id, Node, NodeKey};
use crate::pool::{Launcher, ProcessLauncher, WorkerList, WorkerPool};
use crate::proxy::BroadcastReport;
use crate::state::Context;
use crate::store::{ConfigBlock, NodeConfig};

/// Config id under which the supervisor publishes its own settings.
pub const LOCAL_ID: &str = "local";

/// Registers nodes, runs their hooks and clusters their workers.
#[derive(Debug, Clone)]
pub struct Supervisor {
    ctx: Context,
    hooks: HookRegistry,
    pool: WorkerPool,
    config: SupervisorConfig,
}

impl Supervisor {
    /// Create a supervisor over a fresh context.
    ///
    /// The `local` config block is `config` with `options` merged over it.
    /// That block is only published to workers: the supervisor itself runs
    /// on `config`, so an option named like a setting changes what workers
    /// see, not how the pool behaves.
    pub fn new(config: SupervisorConfig, options: ConfigBlock) -> Self {
        Self::attach_to(&Context::new(), config, options)
    }

    /// Create a supervisor over an existing context.
    ///
    /// Everything already registered survives; only the `local` block is
    /// published again, built as in [`Supervisor::new`].
    pub fn attach_to(ctx: &Context, config: SupervisorConfig, options: ConfigBlock) -> Self {
        let settings = config.to_block();
        let shadowed: Vec<&String> = options.keys().filter(|k| settings.contains_key(*k)).collect();
        if !shadowed.is_empty() {
            warn!(keys = ?shadowed, "options shadow supervisor settings in the local block only");
        }
        ctx.set_config(LOCAL_ID, &NodeConfig::new(Some(settings), Some(options)));
        let pool = WorkerPool::new(
            Arc::new(ProcessLauncher::new()),
            config.restart.clone(),
            config.default_pool_size,
        );
        Self {
            ctx: ctx.clone(),
            hooks: HookRegistry::new(ctx.clone()),
            pool,
            config,
        }
    }

    /// Replace how workers are launched.
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.pool = WorkerPool::new(
            launcher,
            self.config.restart.clone(),
            self.config.default_pool_size,
        );
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Publish `deep_merge(local, provided)` as the config of `id`.
    pub fn set_config(&self, id: &str, config: &NodeConfig) {
        self.ctx.set_config(id, config);
    }

    /// Queue a callback to run before `key`'s workers are spawned.
    pub fn hook<F>(&self, key: impl Into<NodeKey>, func: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.hook(key, Hook::new(func));
    }

    pub fn add_hook(&self, key: impl Into<NodeKey>, hook: Hook) {
        self.hooks.hook(key, hook);
    }

    pub fn run_hooks(&self, id: &str) -> Result<usize> {
        self.hooks.run_hooks(id)
    }

    /// Register and cluster `node`. Returns the resolved id.
    ///
    /// Completes once every worker has its hydrate message enqueued; worker
    /// readiness is not awaited.
    pub async fn use_node(&self, node: &dyn Node) -> Result<String> {
        let id = resolve_id(node);
        let existed = self.ctx.register_node(&id, &node.fields());
        self.ctx.set_config(&id, node.config());
        let hooks = self.hooks.run_hooks(&id)?;
        self.pool.cluster(&self.ctx, node, &id).await?;

        info!(
            node_id = %id,
            repeat = existed,
            hooks,
            workers = self.ctx.workers(&id).len(),
            methods = ?self.ctx.methods(&id),
            "node clustered"
        );
        Ok(id)
    }

    /// Invoke the proxy `method` of `id`.
    pub fn call(&self, id: &str, method: &str, args: Vec<Value>) -> Result<BroadcastReport> {
        let proxy = self
            .ctx
            .method(id, method)
            .ok_or_else(|| SupervisorError::UnknownMethod {
                node_id: id.to_string(),
                method: method.to_string(),
            })?;
        proxy.call(args)
    }

    pub fn workers(&self, id: &str) -> WorkerList {
        self.ctx.workers(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MockLauncher;
    use crate::store::into_block;
    use serde_json::json;

    #[test]
    fn test_local_block_merges_options() {
        let supervisor = Supervisor::new(
            SupervisorConfig::default(),
            into_block(json!({"app": "demo", "region": {"zone": "a"}})).unwrap(),
        );

        let local = supervisor.context().config(LOCAL_ID).unwrap();
        assert_eq!(local["app"], json!("demo"));
        assert_eq!(local["region"], json!({"zone": "a"}));
        assert_eq!(local["log_level"], json!("info"));
        assert_eq!(local["default_pool_size"], json!(1));
    }

    #[tokio::test]
    async fn test_options_do_not_change_pool_behaviour() {
        let launcher = Arc::new(MockLauncher::new());
        let supervisor = Supervisor::new(
            SupervisorConfig::default(),
            into_block(json!({"default_pool_size": 4})).unwrap(),
        )
        .with_launcher(launcher.clone());

        // Workers see the option, the pool keeps the configured size.
        let local = supervisor.context().config(LOCAL_ID).unwrap();
        assert_eq!(local["default_pool_size"], json!(4));

        let id = supervisor
            .use_node(&crate::node::NodeSpec::new("Core", "core.js").with_operation("foo"))
            .await
            .unwrap();
        assert_eq!(supervisor.workers(&id).len(), 1);
        assert_eq!(launcher.launched(), 1);
    }

    #[tokio::test]
    async fn test_attach_keeps_registered_nodes() {
        let launcher = Arc::new(MockLauncher::new());
        let first = Supervisor::new(SupervisorConfig::default(), ConfigBlock::new())
            .with_launcher(launcher.clone());
        first
            .use_node(&crate::node::NodeSpec::new("Core", "core.js").with_operation("foo"))
            .await
            .unwrap();

        let second = Supervisor::attach_to(
            first.context(),
            SupervisorConfig::default(),
            into_block(json!({"layer": 2})).unwrap(),
        );

        assert!(second.context().ptr_eq(first.context()));
        assert!(second.context().has_node("core"));
        assert_eq!(second.context().config(LOCAL_ID).unwrap()["layer"], json!(2));
    }

    #[test]
    fn test_call_unknown_method() {
        let supervisor = Supervisor::new(SupervisorConfig::default(), ConfigBlock::new());
        let err = supervisor.call("core", "foo", vec![]).unwrap_err();
        assert_eq!(err.reason_code(), "unknown_method");
    }
}
