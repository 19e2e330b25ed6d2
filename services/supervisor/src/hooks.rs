//! Pre-cluster hooks.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SupervisorError};
use crate::node::NodeKey;
use crate::state::Context;

type HookFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;

/// A zero-argument callback run before a node's workers are spawned.
#[derive(Clone)]
pub struct Hook {
    label: String,
    func: Arc<HookFn>,
}

impl Hook {
    /// Create a hook labelled with the closure's type name.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::named(std::any::type_name::<F>(), func)
    }

    pub fn named<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Text standing in for the hook's source when the state is serialized.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run(&self) -> anyhow::Result<()> {
        (self.func)()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.label).finish()
    }
}

/// Ordered hook lists per node id.
#[derive(Debug, Clone)]
pub struct HookRegistry {
    ctx: Context,
}

impl HookRegistry {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Append a hook, creating the node entry if needed.
    pub fn hook(&self, key: impl Into<NodeKey>, hook: Hook) {
        let key = key.into();
        debug!(node_id = %key, hook = hook.label(), "hook registered");
        self.ctx.add_hook(key.as_str(), hook);
    }

    /// Run every hook of `id` in insertion order.
    ///
    /// Hooks stay registered. The first failing hook stops the run.
    pub fn run_hooks(&self, id: &str) -> Result<usize> {
        let hooks = self.ctx.hooks(id)?;
        for hook in &hooks {
            hook.run().map_err(|source| SupervisorError::Hook {
                node_id: id.to_string(),
                label: hook.label().to_string(),
                source,
            })?;
        }
        debug!(node_id = %id, count = hooks.len(), "hooks run");
        Ok(hooks.len())
    }
}
