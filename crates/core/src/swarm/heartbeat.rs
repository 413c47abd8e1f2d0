//! # Heartbeat Loop
//!
//! Background task that reports the agent's status to the coordinator on a
//! fixed interval. A failed tick is logged, announced as a
//! `HeartbeatFailed` event and retried after [`RETRY_DELAY`]; the loop only
//! ends when cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::coordinator::{CoordinatorApi, Heartbeat};
use super::reporter::TaskReporter;

/// Delay before retrying after a failed heartbeat
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Produces the payload for each tick
pub type HeartbeatSource = Arc<dyn Fn() -> Heartbeat + Send + Sync>;

/// Handle to a running heartbeat loop
pub struct HeartbeatHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("heartbeat loop panicked: {}", e);
            }
        }
    }
}

/// Spawn the heartbeat loop.
///
/// The loop stops when `token` is cancelled or `running` goes false. Both
/// the in-flight request and the sleep between ticks observe cancellation.
/// Failed ticks are published through `reporter` when one is given.
pub fn spawn_heartbeat(
    coordinator: Arc<dyn CoordinatorApi>,
    source: HeartbeatSource,
    interval: Duration,
    running: Arc<AtomicBool>,
    reporter: Option<TaskReporter>,
    token: CancellationToken,
) -> HeartbeatHandle {
    let loop_token = token.clone();
    let task = tokio::spawn(async move {
        let mut consecutive_failures: u32 = 0;

        loop {
            if loop_token.is_cancelled() || !running.load(Ordering::SeqCst) {
                break;
            }

            let heartbeat = source();
            let agent_id = heartbeat.agent_id.clone();

            let outcome = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                outcome = coordinator.heartbeat(&heartbeat) => outcome,
            };

            let delay = match outcome {
                Ok(()) => {
                    if consecutive_failures > 0 {
                        tracing::info!(agent_id = %agent_id, consecutive_failures, "heartbeat recovered");
                    }
                    consecutive_failures = 0;
                    interval
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        agent_id = %agent_id,
                        consecutive_failures,
                        "heartbeat failed, retrying in {:?}: {}",
                        RETRY_DELAY,
                        e
                    );
                    if let Some(reporter) = &reporter {
                        reporter.heartbeat_failed(consecutive_failures, &e.to_string());
                    }
                    RETRY_DELAY
                }
            };

            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("heartbeat loop stopped");
    });

    HeartbeatHandle { token, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WorkerError};
    use crate::memory::InMemoryStore;
    use crate::models::{AgentCapabilities, AgentIdentity, AgentType};
    use crate::swarm::coordinator::Registration;
    use crate::swarm::events::SwarmEventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Records heartbeat times; fails the first `fail_first` calls
    struct FlakyCoordinator {
        calls: Mutex<Vec<Instant>>,
        fail_first: usize,
    }

    #[async_trait]
    impl CoordinatorApi for FlakyCoordinator {
        async fn register(&self, _registration: &Registration) -> Result<()> {
            Ok(())
        }

        async fn unregister(&self, _agent_id: &str) -> Result<()> {
            Ok(())
        }

        async fn heartbeat(&self, _heartbeat: &Heartbeat) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() <= self.fail_first {
                Err(WorkerError::Coordinator("heartbeat returned 500".into()))
            } else {
                Ok(())
            }
        }
    }

    fn source() -> HeartbeatSource {
        let identity = AgentIdentity::new(AgentType::Tester, AgentCapabilities::default());
        Arc::new(move || Heartbeat::from(&identity))
    }

    fn offsets(coordinator: &FlakyCoordinator, start: Instant) -> Vec<u64> {
        coordinator
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start).as_secs())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_backs_off_then_resumes_interval() {
        let coordinator = Arc::new(FlakyCoordinator {
            calls: Mutex::new(Vec::new()),
            fail_first: 1,
        });
        let start = Instant::now();

        let handle = spawn_heartbeat(
            coordinator.clone(),
            source(),
            Duration::from_secs(30),
            Arc::new(AtomicBool::new(true)),
            None,
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(66)).await;
        assert!(!handle.is_finished());
        handle.shutdown().await;

        assert_eq!(offsets(&coordinator, start), vec![0, 5, 35, 65]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let coordinator = Arc::new(FlakyCoordinator {
            calls: Mutex::new(Vec::new()),
            fail_first: 0,
        });
        let start = Instant::now();

        let handle = spawn_heartbeat(
            coordinator.clone(),
            source(),
            Duration::from_secs(3600),
            Arc::new(AtomicBool::new(true)),
            None,
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown().await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(offsets(&coordinator, start), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_emits_event() {
        let coordinator = Arc::new(FlakyCoordinator {
            calls: Mutex::new(Vec::new()),
            fail_first: 2,
        });
        let (tx, mut rx) = mpsc::channel(8);
        let store = Arc::new(InMemoryStore::new());
        let reporter = TaskReporter::new("tester-1", "tester-agent-1", store).with_event_channel(tx);

        let handle = spawn_heartbeat(
            coordinator.clone(),
            source(),
            Duration::from_secs(30),
            Arc::new(AtomicBool::new(true)),
            Some(reporter),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.shutdown().await;

        let mut failures = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.kind, SwarmEventKind::HeartbeatFailed);
            assert_eq!(event.agent, "tester-agent-1");
            failures.push(event.data.unwrap());
        }
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["consecutive_failures"], 1);
        assert_eq!(failures[1]["consecutive_failures"], 2);
        assert!(failures[1]["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_not_running_exits_immediately() {
        let coordinator = Arc::new(FlakyCoordinator {
            calls: Mutex::new(Vec::new()),
            fail_first: 0,
        });

        let handle = spawn_heartbeat(
            coordinator.clone(),
            source(),
            Duration::from_secs(30),
            Arc::new(AtomicBool::new(false)),
            None,
            CancellationToken::new(),
        );
        handle.shutdown().await;

        assert!(coordinator.calls.lock().unwrap().is_empty());
    }
}
