//! Worker handles and the shared per-node worker list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::error::SupervisorError;
use crate::protocol::WorkerMessage;

/// Process-unique worker identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

static WORKER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl WorkerId {
    fn next() -> Self {
        WorkerId(WORKER_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Worker lifecycle states.
///
/// ```text
/// Starting → Running → Exited → Restarting → Replaced
///                                    └──────→ Degraded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, hydrate not yet enqueued.
    Starting,
    /// Hydrated (or a replacement that skipped hydration) and accepting calls.
    Running,
    /// The process is gone.
    Exited,
    /// The process is gone and a replacement is scheduled.
    Restarting,
    /// The process is gone and a replacement was appended.
    Replaced,
    /// The process is gone and the restart budget is spent.
    Degraded,
}

impl WorkerState {
    pub fn is_alive(&self) -> bool {
        matches!(self, WorkerState::Starting | WorkerState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Exited => "exited",
            WorkerState::Restarting => "restarting",
            WorkerState::Replaced => "replaced",
            WorkerState::Degraded => "degraded",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one spawned worker process.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    node_id: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    replaces: Option<WorkerId>,
    channel: mpsc::UnboundedSender<WorkerMessage>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// Create a handle in `Starting`; the returned sender drives its state.
    pub fn new(
        node_id: impl Into<String>,
        pid: Option<u32>,
        channel: mpsc::UnboundedSender<WorkerMessage>,
        replaces: Option<WorkerId>,
    ) -> (Self, watch::Sender<WorkerState>) {
        let (state_tx, state_rx) = watch::channel(WorkerState::Starting);
        let handle = Self {
            id: WorkerId::next(),
            node_id: node_id.into(),
            pid,
            started_at: Utc::now(),
            replaces,
            channel,
            state: state_rx,
        };
        (handle, state_tx)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The worker this one was spawned to replace.
    pub fn replaces(&self) -> Option<WorkerId> {
        self.replaces
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Receiver for state transitions.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    /// Enqueue a message for the worker. Never blocks.
    pub fn send(&self, msg: WorkerMessage) -> Result<(), SupervisorError> {
        self.channel
            .send(msg)
            .map_err(|_| SupervisorError::ChannelClosed {
                node_id: self.node_id.clone(),
                worker_id: self.id,
            })
    }
}

/// Ordered worker list of one node, shared with proxies and exit watchers.
#[derive(Debug, Clone, Default)]
pub struct WorkerList(Arc<RwLock<Vec<WorkerHandle>>>);

impl WorkerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handle: WorkerHandle) {
        self.write().push(handle);
    }

    /// Copy of the current handles, in spawn order.
    pub fn handles(&self) -> Vec<WorkerHandle> {
        self.read().clone()
    }

    pub fn get(&self, index: usize) -> Option<WorkerHandle> {
        self.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.read().iter().filter(|h| h.is_alive()).count()
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<WorkerHandle>> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<WorkerHandle>> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
