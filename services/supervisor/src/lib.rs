//! blitz supervisor
//!
//! Process clustering and broadcast method dispatch. A parent process
//! registers logical *nodes*, spawns worker processes for each one, hydrates
//! every worker with a serialized snapshot of the shared state, and exposes
//! each declared operation of a node as a proxy that broadcasts `call`
//! messages to the node's workers.
//!
//! ## Architecture
//!
//! - **Context**: Shared state (config blocks, node entries, logging sink)
//! - **Hook Registry**: Callbacks run before a node's workers are spawned
//! - **Worker Pool**: Spawns workers and restarts them when they exit
//! - **Method Proxies**: Fire-and-forget broadcast of calls to every worker
//! - **Worker Runtime**: The child side, fed NDJSON messages on stdin
//!
//! ## Example
//!
//! ```no_run
//! use blitz_supervisor::{NodeSpec, Supervisor, SupervisorConfig};
//! use blitz_supervisor::store::ConfigBlock;
//!
//! # async fn demo() -> blitz_supervisor::Result<()> {
//! let supervisor = Supervisor::new(SupervisorConfig::default(), ConfigBlock::new());
//! supervisor.hook("mailer", || Ok(()));
//!
//! let node = NodeSpec::new("Mailer", "./mailer-worker").with_operation("send");
//! let id = supervisor.use_node(&node).await?;
//! supervisor.call(&id, "send", vec!["hello".into()])?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod node;
pub mod pool;
pub mod protocol;
pub mod proxy;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::{LogFormat, SupervisorConfig};
pub use error::{Result, SupervisorError};
pub use hooks::Hook;
pub use node::{resolve_id, Capabilities, Node, NodeKey, NodeSpec, Operation};
pub use pool::{RestartPolicy, WorkerState};
pub use proxy::{BroadcastReport, MethodProxy};
pub use state::Context;
pub use store::{deep_merge, NodeConfig};
pub use supervisor::Supervisor;
pub use worker::{WorkerNode, WorkerRuntime};
