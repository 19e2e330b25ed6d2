//! Worker side of the protocol.
//!
//! A worker process reads NDJSON messages from stdin. `setGlobal` folds the
//! parent's snapshot into the worker's context; `call` decodes the argument
//! list and hands it to the [`WorkerNode`]. A snapshot with the same shape as
//! the one last absorbed is counted and otherwise ignored.

use async_trait::async_trait;
use blitz_codec::{shape_eq, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::protocol::{CallRequest, WorkerMessage};
use crate::state::Context;

pub use crate::protocol::is_worker;

/// The node implementation running inside a worker.
#[async_trait]
pub trait WorkerNode: Send {
    /// Called once after each `setGlobal` that changed the snapshot.
    async fn hydrated(&mut self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run `method` with the decoded arguments.
    async fn dispatch(&mut self, ctx: &Context, method: &str, args: Vec<Value>) -> anyhow::Result<()>;
}

/// Counters for one run of the worker loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub hydrates: usize,
    /// Snapshots identical in shape to the previous one.
    pub redundant: usize,
    pub calls: usize,
    /// Lines that could not be parsed or decoded.
    pub rejected: usize,
    /// Calls the node returned an error for.
    pub failed: usize,
}

/// Drives a [`WorkerNode`] from a message stream.
pub struct WorkerRuntime<N> {
    ctx: Context,
    node: N,
}

impl<N: WorkerNode> WorkerRuntime<N> {
    pub fn new(ctx: Context, node: N) -> Self {
        Self { ctx, node }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn into_node(self) -> N {
        self.node
    }

    /// Process messages until EOF.
    ///
    /// Bad lines and failing calls are logged and skipped.
    pub async fn run<R>(&mut self, reader: R) -> anyhow::Result<RunStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = RunStats::default();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let msg = match serde_json::from_str::<WorkerMessage>(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed message");
                    stats.rejected += 1;
                    continue;
                }
            };

            match msg {
                WorkerMessage::SetGlobal { data } => {
                    let snapshot = match blitz_codec::deserialize(&data) {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            warn!(error = %e, "ignoring undecodable snapshot");
                            stats.rejected += 1;
                            continue;
                        }
                    };
                    if self
                        .ctx
                        .hydrated()
                        .is_some_and(|previous| shape_eq(&previous, &snapshot))
                    {
                        debug!("snapshot unchanged, skipping hydrate");
                        stats.redundant += 1;
                        continue;
                    }
                    if let Err(e) = self.ctx.absorb_snapshot(&snapshot) {
                        warn!(error = %e, "ignoring unusable snapshot");
                        stats.rejected += 1;
                        continue;
                    }
                    stats.hydrates += 1;
                    info!(node_id = ?self.ctx.current_id(), "worker hydrated");
                    if let Err(e) = self.node.hydrated(&self.ctx).await {
                        warn!(error = %e, "hydrate handler failed");
                    }
                }
                WorkerMessage::Call { value: CallRequest { method, args } } => {
                    let args = match decode_args(&args) {
                        Ok(args) => args,
                        Err(e) => {
                            warn!(method = %method, error = %e, "ignoring undecodable arguments");
                            stats.rejected += 1;
                            continue;
                        }
                    };
                    stats.calls += 1;
                    debug!(method = %method, args = args.len(), "dispatching call");
                    if let Err(e) = self.node.dispatch(&self.ctx, &method, args).await {
                        warn!(method = %method, error = %e, "call failed");
                        stats.failed += 1;
                    }
                }
            }
        }

        debug!(?stats, "message stream closed");
        Ok(stats)
    }
}

/// Decode a serialized argument list. A non-array payload is one argument.
fn decode_args(text: &str) -> Result<Vec<Value>, blitz_codec::CodecError> {
    Ok(match blitz_codec::deserialize(text)? {
        Value::Array(items) => items.items(),
        Value::Null => Vec::new(),
        other => vec![other],
    })
}
