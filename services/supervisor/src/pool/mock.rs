//! Mock launcher for testing and development.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::launcher::{ExitReport, LaunchSpec, LaunchedWorker, Launcher};
use crate::protocol::WorkerMessage;

struct MockWorker {
    spec: LaunchSpec,
    pid: u32,
    inbox: Option<mpsc::UnboundedReceiver<WorkerMessage>>,
    received: Vec<WorkerMessage>,
    exit: Option<oneshot::Sender<ExitReport>>,
}

#[derive(Default)]
struct MockState {
    workers: Vec<MockWorker>,
    attempts: usize,
    /// Launch attempts (0-indexed) at or beyond this fail.
    fail_from: Option<usize>,
}

/// Launcher that records launches instead of spawning processes.
///
/// Workers are indexed in launch order. Tests drive exits with
/// [`MockLauncher::exit`] and inspect delivered messages with
/// [`MockLauncher::messages`].
#[derive(Default)]
pub struct MockLauncher {
    state: Mutex<MockState>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose every launch fails.
    pub fn failing() -> Self {
        Self::failing_after(0)
    }

    /// A launcher whose first `n` launches succeed and the rest fail.
    pub fn failing_after(n: usize) -> Self {
        Self {
            state: Mutex::new(MockState {
                fail_from: Some(n),
                ..MockState::default()
            }),
        }
    }

    /// Number of successful launches.
    pub fn launched(&self) -> usize {
        self.lock().workers.len()
    }

    /// Number of launch attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn spec(&self, index: usize) -> Option<LaunchSpec> {
        self.lock().workers.get(index).map(|w| w.spec.clone())
    }

    pub fn pid(&self, index: usize) -> Option<u32> {
        self.lock().workers.get(index).map(|w| w.pid)
    }

    /// All messages delivered to worker `index` so far.
    pub fn messages(&self, index: usize) -> Vec<WorkerMessage> {
        let mut state = self.lock();
        let Some(worker) = state.workers.get_mut(index) else {
            return Vec::new();
        };
        if let Some(inbox) = worker.inbox.as_mut() {
            while let Ok(msg) = inbox.try_recv() {
                worker.received.push(msg);
            }
        }
        worker.received.clone()
    }

    /// Simulate worker `index` exiting. Returns false if it already exited.
    pub fn exit(&self, index: usize, report: ExitReport) -> bool {
        let sender = self
            .lock()
            .workers
            .get_mut(index)
            .and_then(|w| w.exit.take());
        match sender {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }

    /// Drop worker `index`'s inbox so further sends fail.
    pub fn close_channel(&self, index: usize) {
        let mut state = self.lock();
        if let Some(worker) = state.workers.get_mut(index) {
            if let Some(mut inbox) = worker.inbox.take() {
                while let Ok(msg) = inbox.try_recv() {
                    worker.received.push(msg);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Launcher for MockLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<LaunchedWorker> {
        let mut state = self.lock();
        let attempt = state.attempts;
        state.attempts += 1;

        if state.fail_from.is_some_and(|n| attempt >= n) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("[MOCK] cannot launch {}", spec.program.display()),
            ));
        }

        let pid = 10_000 + state.workers.len() as u32;
        info!(
            node_id = %spec.node_id,
            program = %spec.program.display(),
            pid,
            worker_flag = spec.mark_worker,
            "[MOCK] Launching worker"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        state.workers.push(MockWorker {
            spec: spec.clone(),
            pid,
            inbox: Some(rx),
            received: Vec::new(),
            exit: Some(exit_tx),
        });

        Ok(LaunchedWorker {
            pid: Some(pid),
            channel: tx,
            exited: exit_rx,
        })
    }
}
