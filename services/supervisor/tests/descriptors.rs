//! Dead workers must not keep pipes open in the parent.
//!
//! Kept in its own test binary so no other test opens descriptors while
//! this one counts them.
#![cfg(target_os = "linux")]

use std::time::Duration;

use blitz_supervisor::pool::{BackoffPolicy, RestartPolicy, WorkerState};
use blitz_supervisor::store::ConfigBlock;
use blitz_supervisor::{NodeSpec, Supervisor, SupervisorConfig};

fn open_descriptors() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

#[tokio::test]
async fn test_crash_loop_does_not_accumulate_descriptors() {
    let config = SupervisorConfig {
        restart: RestartPolicy {
            max_restarts: Some(40),
            backoff: BackoffPolicy::none(),
            ..RestartPolicy::default()
        },
        ..SupervisorConfig::default()
    };
    let supervisor = Supervisor::new(config, ConfigBlock::new());
    let before = open_descriptors();

    let node = NodeSpec::new("Crash", "sh").with_args(["-c", "exit 1"]);
    supervisor.use_node(&node).await.unwrap();
    let workers = supervisor.workers("crash");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let degraded = workers
            .handles()
            .last()
            .is_some_and(|h| h.state() == WorkerState::Degraded);
        if degraded && open_descriptors() <= before + 4 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} descriptors open after {} exits, {} before",
            open_descriptors(),
            workers.len(),
            before
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(workers.len(), 41);
    assert_eq!(workers.live_count(), 0);
}
