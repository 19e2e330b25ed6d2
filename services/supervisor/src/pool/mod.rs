//! Worker pool.
//!
//! Owns the worker processes of each node: spawns them, hydrates them with
//! the shared state, and hands each one to a restart lineage.

mod handle;
mod launcher;
mod mock;
mod restart;

pub use handle::{WorkerHandle, WorkerId, WorkerList, WorkerState};
pub use launcher::{ExitReport, LaunchSpec, LaunchedWorker, Launcher, ProcessLauncher};
pub use mock::MockLauncher;
pub use restart::{BackoffPolicy, RestartPolicy};

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, SupervisorError};
use crate::node::Node;
use crate::proxy::MethodProxyBuilder;
use crate::state::Context;
use restart::Lineage;

/// Config key holding a node's worker count.
pub const CORES_KEY: &str = "cores";

/// Spawns and supervises worker processes.
#[derive(Clone)]
pub struct WorkerPool {
    launcher: Arc<dyn Launcher>,
    restart: RestartPolicy,
    default_pool_size: usize,
}

impl WorkerPool {
    pub fn new(launcher: Arc<dyn Launcher>, restart: RestartPolicy, default_pool_size: usize) -> Self {
        Self {
            launcher,
            restart,
            default_pool_size: default_pool_size.max(1),
        }
    }

    pub fn restart_policy(&self) -> &RestartPolicy {
        &self.restart
    }

    /// Workers to spawn for `id`: the node's positive `cores` value, else the default.
    pub fn pool_size(&self, ctx: &Context, id: &str) -> usize {
        ctx.config(id)
            .and_then(|block| block.get(CORES_KEY).and_then(serde_json::Value::as_u64))
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(self.default_pool_size)
    }

    /// Spawn the workers of `node` under `id`.
    ///
    /// The node's worker list is emptied first. Each worker is hydrated with
    /// the snapshot taken right after it joins the list, then the node's
    /// proxies are (re)installed and the worker's lineage starts watching it.
    /// Returns once every hydrate message is enqueued.
    pub async fn cluster(&self, ctx: &Context, node: &dyn Node, id: &str) -> Result<()> {
        let size = self.pool_size(ctx, id);
        let workers = ctx.reset_workers(id);
        let spec = LaunchSpec::new(id, node.filename(), node.args().to_vec());

        for slot in 0..size {
            let launched = self
                .launcher
                .launch(&spec)
                .map_err(|source| SupervisorError::Spawn {
                    node_id: id.to_string(),
                    program: spec.program.clone(),
                    source,
                })?;

            let (handle, state) = WorkerHandle::new(id, launched.pid, launched.channel, None);
            workers.push(handle.clone());

            ctx.set_current_id(id);
            let hydrate = ctx.hydrate_message()?;
            if let Err(e) = handle.send(hydrate) {
                warn!(node_id = %id, worker_id = %handle.id(), error = %e, "failed to hydrate worker");
            }
            state.send_replace(WorkerState::Running);

            MethodProxyBuilder::expose_methods(ctx, node, id, &workers);

            info!(
                node_id = %id,
                worker_id = %handle.id(),
                pid = ?handle.pid(),
                slot,
                pool_size = size,
                "worker started"
            );

            let lineage = Lineage {
                ctx: ctx.clone(),
                launcher: Arc::clone(&self.launcher),
                policy: self.restart.clone(),
                spec: spec.clone(),
                workers: workers.clone(),
            };
            tokio::spawn(lineage.supervise(handle.id(), launched.exited, state));
        }

        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("restart", &self.restart)
            .field("default_pool_size", &self.default_pool_size)
            .finish_non_exhaustive()
    }
}
