//! blitz demo binary.
//!
//! Without the worker flag this is the parent: it clusters an `echo` node
//! whose workers are this same binary, broadcasts a few calls, and waits
//! for Ctrl-C. With the flag set it is one of those workers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use blitz_codec::Value;
use tokio::io::BufReader;
use tracing::{info, warn};

use blitz_supervisor::logging;
use blitz_supervisor::store::ConfigBlock;
use blitz_supervisor::worker::is_worker;
use blitz_supervisor::{
    Context, NodeSpec, Supervisor, SupervisorConfig, WorkerNode, WorkerRuntime,
};

/// Worker side of the `echo` node.
struct Echo;

#[async_trait]
impl WorkerNode for Echo {
    async fn hydrated(&mut self, ctx: &Context) -> Result<()> {
        ctx.log().info(format!(
            "echo worker {} hydrated with {} config blocks",
            std::process::id(),
            ctx.config_ids().len()
        ));
        Ok(())
    }

    async fn dispatch(&mut self, ctx: &Context, method: &str, args: Vec<Value>) -> Result<()> {
        match method {
            "say" => {
                let words: Vec<&str> = args.iter().filter_map(Value::as_str).collect();
                ctx.log().info(format!("echo: {}", words.join(" ")));
            }
            "add" => {
                let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
                ctx.log().info(format!("sum: {}", sum));
            }
            other => bail!("echo has no method '{}'", other),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = SupervisorConfig::from_env()?;
    logging::init(config.log_format, &config.log_level)?;

    if is_worker() {
        let mut runtime = WorkerRuntime::new(Context::new(), Echo);
        let stats = runtime.run(BufReader::new(tokio::io::stdin())).await?;
        info!(?stats, "worker exiting");
        return Ok(());
    }

    // Replacements of this binary must come up as workers, not parents.
    if !config.restart.mark_worker_on_restart {
        warn!("forcing worker flag on restarted workers");
        config.restart.mark_worker_on_restart = true;
    }

    info!(
        pool_size = config.default_pool_size,
        max_restarts = ?config.restart.max_restarts,
        "Starting blitz supervisor"
    );

    let program = std::env::current_exe()?;
    let supervisor = Supervisor::new(config, ConfigBlock::new());

    supervisor.hook("echo", || {
        info!("preparing echo node");
        Ok(())
    });

    let node = NodeSpec::new("Echo", program)
        .with_operation("say")
        .with_operation_arity("add", 2);
    let id = supervisor.use_node(&node).await?;

    let report = supervisor.call(&id, "say", vec!["hello".into(), "workers".into()])?;
    info!(delivered = report.delivered_count(), "say broadcast");
    let report = supervisor.call(&id, "add", vec![1.into(), 2.into()])?;
    info!(delivered = report.delivered_count(), "add broadcast");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    Ok(())
}
