//! Worker process launching.
//!
//! The launcher interface abstracts how a worker comes to life:
//! - `ProcessLauncher` runs the node's program as a child OS process and
//!   streams messages to it as NDJSON on stdin
//! - `MockLauncher` (see `mock.rs`) records launches for tests

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::protocol::{WorkerMessage, WORKER_ENV};

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub node_id: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Set the worker environment flag on the child.
    pub mark_worker: bool,
}

impl LaunchSpec {
    pub fn new(node_id: impl Into<String>, program: impl AsRef<Path>, args: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            program: program.as_ref().to_path_buf(),
            args,
            mark_worker: true,
        }
    }

    pub fn with_mark_worker(mut self, mark_worker: bool) -> Self {
        self.mark_worker = mark_worker;
        self
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReport {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }
}

/// A freshly launched worker.
#[derive(Debug)]
pub struct LaunchedWorker {
    pub pid: Option<u32>,
    /// Message channel into the worker.
    pub channel: mpsc::UnboundedSender<WorkerMessage>,
    /// Resolves once when the process exits.
    pub exited: oneshot::Receiver<ExitReport>,
}

/// Worker launching interface.
pub trait Launcher: Send + Sync {
    /// Start a worker. Must not block.
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<LaunchedWorker>;
}

/// Launches workers as child processes.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<LaunchedWorker> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if spec.mark_worker {
            cmd.env(WORKER_ENV, "true");
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();

        info!(
            node_id = %spec.node_id,
            program = %spec.program.display(),
            pid = ?pid,
            worker_flag = spec.mark_worker,
            "worker process spawned"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let (exit_tx, exit_rx) = oneshot::channel();

        // Writer: the only task touching the child's stdin. It lives no
        // longer than the child, so a dead worker holds no pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let node_id = spec.node_id.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let line = match msg.to_line() {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(node_id = %node_id, error = %e, "failed to encode message");
                            continue;
                        }
                    };
                    if let Err(e) = stdin.write_all(line.as_bytes()).await {
                        debug!(node_id = %node_id, pid = ?pid, error = %e, "worker stdin closed");
                        break;
                    }
                    if let Err(e) = stdin.flush().await {
                        debug!(node_id = %node_id, pid = ?pid, error = %e, "worker stdin flush failed");
                        break;
                    }
                }
            })
        });

        let node_id = spec.node_id.clone();
        tokio::spawn(async move {
            let report = match child.wait().await {
                Ok(status) => exit_report(status),
                Err(e) => {
                    warn!(node_id = %node_id, pid = ?pid, error = %e, "failed to wait for worker");
                    ExitReport::default()
                }
            };
            // Stdin is dropped with the writer before anyone hears of the exit.
            if let Some(writer) = writer {
                writer.abort();
                let _ = writer.await;
            }
            debug!(node_id = %node_id, pid = ?pid, code = ?report.code, signal = ?report.signal, "worker process exited");
            let _ = exit_tx.send(report);
        });

        Ok(LaunchedWorker {
            pid,
            channel: tx,
            exited: exit_rx,
        })
    }
}

#[cfg(unix)]
fn exit_report(status: std::process::ExitStatus) -> ExitReport {
    use std::os::unix::process::ExitStatusExt;
    ExitReport {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_report(status: std::process::ExitStatus) -> ExitReport {
    ExitReport {
        code: status.code(),
        signal: None,
    }
}
