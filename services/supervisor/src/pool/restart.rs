//! Crash restart of worker processes.
//!
//! Each initially spawned worker starts a *lineage*: when its process exits,
//! one replacement is launched from the same program and appended to the
//! node's worker list, and the replacement is watched the same way. The dead
//! handle stays in the list.
//!
//! Two gaps of the restart path are kept unless switched off in
//! [`RestartPolicy`]: replacements are launched without the worker
//! environment flag, and they are not sent a hydrate message.
//!
//! Restarts are counted per lineage within a sliding window.
//! [`RestartPolicy::unbounded`] disables the budget and the backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::handle::{WorkerHandle, WorkerId, WorkerList, WorkerState};
use super::launcher::{ExitReport, LaunchSpec, Launcher};
use crate::state::Context;

// =============================================================================
// Backoff Policy
// =============================================================================

/// Delay before a lineage launches its next replacement.
///
/// The delay doubles with every restart still inside the window, so a lineage
/// that stays up long enough for its old restarts to age out starts again
/// from `base`.
#[derive(Debug, Clone, Serialize)]
pub struct BackoffPolicy {
    /// Delay after the first exit in a quiet window.
    pub base: Duration,

    /// Ceiling for the doubled delay.
    pub max: Duration,

    /// Fraction of the delay that may be cut at random, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Restart immediately.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay for a lineage with `recent` restarts inside the window.
    ///
    /// Never exceeds `max`; jitter only shortens it.
    pub fn restart_delay(&self, recent: usize) -> Duration {
        let doublings = recent.min(MAX_DOUBLINGS) as u32;
        let ceiling = self.base.saturating_mul(1 << doublings).min(self.max);

        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if jitter == 0.0 || ceiling.is_zero() {
            return ceiling;
        }
        ceiling.mul_f64(1.0 - jitter * unit_spread())
    }
}

/// Doublings past this count are clamped.
const MAX_DOUBLINGS: usize = 24;

/// A value in `[0, 1)`.
fn unit_spread() -> f64 {
    rand::rng().random::<f64>()
}

// =============================================================================
// Restart Policy
// =============================================================================

/// Worker restart policy.
#[derive(Debug, Clone, Serialize)]
pub struct RestartPolicy {
    /// Maximum restarts per lineage within the window. `None` is unbounded.
    pub max_restarts: Option<u32>,

    /// Time window for counting restarts.
    pub window: Duration,

    /// Backoff policy for restarts.
    pub backoff: BackoffPolicy,

    /// Send replacements a hydrate message.
    pub hydrate_on_restart: bool,

    /// Launch replacements with the worker environment flag.
    pub mark_worker_on_restart: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: Some(5),
            window: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
            hydrate_on_restart: false,
            mark_worker_on_restart: false,
        }
    }
}

impl RestartPolicy {
    /// Restart forever, immediately, with both restart gaps in place.
    pub fn unbounded() -> Self {
        Self {
            max_restarts: None,
            window: Duration::from_secs(300),
            backoff: BackoffPolicy::none(),
            hydrate_on_restart: false,
            mark_worker_on_restart: false,
        }
    }

    fn exhausted(&self, recent: usize) -> bool {
        self.max_restarts.is_some_and(|max| recent >= max as usize)
    }
}

// =============================================================================
// Lineage
// =============================================================================

/// Watches one worker and its successive replacements.
pub(crate) struct Lineage {
    pub ctx: Context,
    pub launcher: Arc<dyn Launcher>,
    pub policy: RestartPolicy,
    pub spec: LaunchSpec,
    pub workers: WorkerList,
}

impl Lineage {
    /// Run until the restart budget is spent.
    pub async fn supervise(
        self,
        mut worker_id: WorkerId,
        mut exited: oneshot::Receiver<ExitReport>,
        mut state: watch::Sender<WorkerState>,
    ) {
        let node_id = self.spec.node_id.clone();
        let mut restarts: Vec<Instant> = Vec::new();

        loop {
            // A dropped sender means the exit went unobserved; treat it as an exit.
            let report = exited.await.unwrap_or_default();
            state.send_replace(WorkerState::Exited);
            info!(
                node_id = %node_id,
                worker_id = %worker_id,
                code = ?report.code,
                signal = ?report.signal,
                "worker exited"
            );

            let replacement = loop {
                let now = Instant::now();
                restarts.retain(|t| now.duration_since(*t) < self.policy.window);

                if self.policy.exhausted(restarts.len()) {
                    warn!(
                        node_id = %node_id,
                        worker_id = %worker_id,
                        restarts = restarts.len(),
                        "worker exceeded max restarts, marking as degraded"
                    );
                    state.send_replace(WorkerState::Degraded);
                    return;
                }

                state.send_replace(WorkerState::Restarting);
                let delay = self.policy.backoff.restart_delay(restarts.len());
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    debug!(node_id = %node_id, delay_ms = delay.as_millis(), "scheduling worker restart");
                    tokio::time::sleep(delay).await;
                }
                restarts.push(Instant::now());

                let spec = self
                    .spec
                    .clone()
                    .with_mark_worker(self.policy.mark_worker_on_restart);
                match self.launcher.launch(&spec) {
                    Ok(launched) => break launched,
                    Err(e) => {
                        // A replacement that never started counts as another exit.
                        error!(
                            node_id = %node_id,
                            program = %spec.program.display(),
                            error = %e,
                            "failed to launch replacement worker"
                        );
                    }
                }
            };

            let (handle, next_state) = WorkerHandle::new(
                node_id.clone(),
                replacement.pid,
                replacement.channel,
                Some(worker_id),
            );
            self.workers.push(handle.clone());
            state.send_replace(WorkerState::Replaced);

            if self.policy.hydrate_on_restart {
                match self.ctx.hydrate_message() {
                    Ok(msg) => {
                        if let Err(e) = handle.send(msg) {
                            warn!(node_id = %node_id, worker_id = %handle.id(), error = %e, "failed to hydrate replacement");
                        }
                    }
                    Err(e) => {
                        error!(node_id = %node_id, error = %e, "failed to serialize state for replacement");
                    }
                }
            }
            next_state.send_replace(WorkerState::Running);

            info!(
                node_id = %node_id,
                worker_id = %handle.id(),
                replaces = %worker_id,
                pid = ?handle.pid(),
                total_workers = self.workers.len(),
                "replacement worker started"
            );

            worker_id = handle.id();
            exited = replacement.exited;
            state = next_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_with_recent_restarts() {
        let backoff = BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::default()
        };

        assert_eq!(backoff.restart_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.restart_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.restart_delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_delay_stops_at_ceiling() {
        let backoff = BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
            jitter: 0.0,
        };

        assert_eq!(backoff.restart_delay(3), Duration::from_secs(5));
        assert_eq!(backoff.restart_delay(usize::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_only_shortens_delay() {
        let backoff = BackoffPolicy::default();
        for recent in 0..8 {
            let ceiling = BackoffPolicy {
                jitter: 0.0,
                ..backoff.clone()
            }
            .restart_delay(recent);
            let delay = backoff.restart_delay(recent);
            assert!(delay <= ceiling);
            assert!(delay >= ceiling.mul_f64(0.75));
        }
    }

    #[test]
    fn test_unit_spread_is_in_range() {
        for _ in 0..64 {
            let x = unit_spread();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_none_backoff_is_zero() {
        assert!(BackoffPolicy::none().restart_delay(7).is_zero());
    }

    #[test]
    fn test_restart_policy_default() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.max_restarts, Some(5));
        assert_eq!(policy.window, Duration::from_secs(300));
        assert!(!policy.hydrate_on_restart);
        assert!(!policy.mark_worker_on_restart);
    }

    #[test]
    fn test_unbounded_is_never_exhausted() {
        assert!(!RestartPolicy::unbounded().exhausted(usize::MAX));
        assert!(RestartPolicy::default().exhausted(5));
        assert!(!RestartPolicy::default().exhausted(4));
    }
}
