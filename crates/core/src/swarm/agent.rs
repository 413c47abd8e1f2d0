//! # Swarm Agent
//!
//! Lifecycle and task execution engine for one agent process.
//!
//! ```text
//!            execute_task()                 executor returns / fails / panics
//!   idle ─────────────────────► busy ───────────────────────────────────► idle
//!     ▲  (rejected with TaskExecution         │ stop()                     │
//!     │   error unless idle)                  └──── busy until the ──► offline
//!     │                                             task ends              │
//!     └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identity, status, current task and performance live under one short-held
//! mutex, never held across an `.await`. Admission is an atomic
//! check-and-set, and the busy state is undone by a drop guard. A caller
//! that drops the future mid-task still gets the agent back to idle, and
//! the abandoned task is reported as cancelled.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::coordinator::{CoordinatorApi, Heartbeat, Registration};
use super::events::{SwarmEvent, SwarmEventKind};
use super::heartbeat::{spawn_heartbeat, HeartbeatHandle, HeartbeatSource};
use super::reporter::TaskReporter;
use crate::assistant::FlowHooks;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::memory::{CoordinationStore, Messenger};
use crate::models::{
    AgentIdentity, AgentStatus, CoordinationMessage, TaskContext, TaskResult,
};
use crate::skills::TaskExecutor;

struct AgentState {
    identity: AgentIdentity,
    task: Option<TaskContext>,
    task_started: Option<Instant>,
    /// `stop()` already announced the in-flight task as cancelled
    cancel_reported: bool,
}

fn lock_state(state: &Mutex<AgentState>) -> MutexGuard<'_, AgentState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the current task when execution ends, however it ends.
///
/// If the task never produced a result (the future was dropped), the
/// attempt is recorded as a failure and reported as cancelled.
struct BusyGuard {
    state: Arc<Mutex<AgentState>>,
    stopped: Arc<AtomicBool>,
    reporter: TaskReporter,
    finished: bool,
}

impl BusyGuard {
    /// The engine produced a result for this task
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = lock_state(&self.state);
            let abandoned = match (&state.task, self.finished || state.cancel_reported) {
                (Some(task), false) => {
                    let elapsed = state
                        .task_started
                        .map(|t| t.elapsed().as_secs_f64())
                        .unwrap_or_default();
                    Some(TaskResult {
                        error: Some("Task execution abandoned before completion".to_string()),
                        ..TaskResult::cancelled(&task.task_id, &state.identity.id, elapsed)
                    })
                }
                _ => None,
            };
            if let Some(result) = &abandoned {
                state
                    .identity
                    .performance
                    .record(false, result.execution_time);
            }

            if self.stopped.load(Ordering::SeqCst) {
                state.identity.status = AgentStatus::Offline;
            } else if state.identity.status == AgentStatus::Busy {
                state.identity.status = AgentStatus::Idle;
            }
            state.identity.current_task = None;
            state.task = None;
            state.task_started = None;
            state.cancel_reported = false;
            abandoned
        };

        let Some(result) = abandoned else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reporter = self.reporter.clone();
                handle.spawn(async move { reporter.task_cancelled(&result).await });
            }
            Err(_) => tracing::warn!(
                task_id = %result.task_id,
                "task abandoned outside a runtime; cancellation not reported"
            ),
        }
    }
}

/// A single agent: identity, coordinator presence and the task engine
pub struct SwarmAgent {
    config: WorkerConfig,
    state: Arc<Mutex<AgentState>>,
    executor: Arc<dyn TaskExecutor>,
    coordinator: Arc<dyn CoordinatorApi>,
    messenger: Messenger,
    reporter: TaskReporter,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    heartbeat: tokio::sync::Mutex<Option<HeartbeatHandle>>,
    /// Serializes start/stop
    lifecycle: tokio::sync::Mutex<()>,
}

impl SwarmAgent {
    pub fn new(
        config: WorkerConfig,
        executor: Arc<dyn TaskExecutor>,
        coordinator: Arc<dyn CoordinatorApi>,
        store: Arc<dyn CoordinationStore>,
    ) -> Self {
        let mut identity = AgentIdentity::new(executor.agent_type(), executor.capabilities())
            .with_coordinator_url(config.coordinator_url.clone());
        if let Some(id) = &config.agent_id {
            identity = identity.with_id(id.clone());
        }
        if let Some(name) = &config.agent_name {
            identity = identity.with_name(name.clone());
        }

        let messenger = Messenger::new(identity.id.clone(), Arc::clone(&store));
        let reporter = TaskReporter::new(&identity.id, &identity.name, store);

        Self {
            config,
            state: Arc::new(Mutex::new(AgentState {
                identity,
                task: None,
                task_started: None,
                cancel_reported: false,
            })),
            executor,
            coordinator,
            messenger,
            reporter,
            running: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            heartbeat: tokio::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Publish lifecycle events to `tx`
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.reporter = self.reporter.with_event_channel(tx);
        self
    }

    /// Run pre/post task hooks through the flow CLI
    pub fn with_flow_hooks(mut self, flow_command: Vec<String>) -> Self {
        let (id, agent_type) = {
            let state = self.state();
            (state.identity.id.clone(), state.identity.agent_type)
        };
        self.reporter = self
            .reporter
            .with_hooks(FlowHooks::new(flow_command, id, agent_type));
        self
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        lock_state(&self.state)
    }

    /// Snapshot of the identity record
    pub fn identity(&self) -> AgentIdentity {
        self.state().identity.clone()
    }

    pub fn id(&self) -> String {
        self.state().identity.id.clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.state().identity.status
    }

    pub fn current_task(&self) -> Option<String> {
        self.state().identity.current_task.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Register with the coordinator and start heartbeating.
    ///
    /// Registration failure is returned and leaves the agent not running.
    #[tracing::instrument(skip(self), fields(agent_id = %self.id()))]
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (registration, name) = {
            let mut state = self.state();
            state.identity.status = if state.task.is_some() {
                AgentStatus::Busy
            } else {
                AgentStatus::Idle
            };
            (
                Registration::from(&state.identity),
                state.identity.name.clone(),
            )
        };

        if let Some(hooks) = self.reporter.hooks() {
            hooks.agent_spawn(&name).await;
        }

        if let Err(e) = self.coordinator.register(&registration).await {
            self.state().identity.status = AgentStatus::Error;
            tracing::error!("registration failed: {}", e);
            return Err(WorkerError::Registration(e.to_string()));
        }

        self.running.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let source: HeartbeatSource = Arc::new(move || Heartbeat::from(&lock_state(&state).identity));
        let handle = spawn_heartbeat(
            Arc::clone(&self.coordinator),
            source,
            Duration::from_secs(self.config.heartbeat_interval),
            Arc::clone(&self.running),
            Some(self.reporter.clone()),
            CancellationToken::new(),
        );
        *self.heartbeat.lock().await = Some(handle);

        tracing::info!(name = %name, agent_type = %registration.agent_type, "agent started");
        self.reporter.emit(
            SwarmEvent::new(SwarmEventKind::AgentStarted, &name)
                .with_data(json!({ "coordinator_url": self.config.coordinator_url })),
        );
        Ok(())
    }

    /// Shut the agent down. Safe to call more than once.
    ///
    /// An in-flight task is reported as cancelled but keeps running until
    /// its executor returns; the engine does not preempt it. Until then the
    /// agent stays busy with `current_task` set, and goes offline when the
    /// task ends.
    #[tracing::instrument(skip(self), fields(agent_id = %self.id()))]
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("agent already stopped");
            return;
        }
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let (agent_id, name, in_flight) = {
            let mut state = self.state();
            state.cancel_reported = state.task.is_some();
            let in_flight = state.task.as_ref().map(|task| {
                let elapsed = state
                    .task_started
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or_default();
                (task.task_id.clone(), elapsed)
            });
            (state.identity.id.clone(), state.identity.name.clone(), in_flight)
        };

        if let Some((task_id, elapsed)) = in_flight {
            let result = TaskResult::cancelled(&task_id, &agent_id, elapsed);
            self.reporter.task_cancelled(&result).await;
        }

        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.shutdown().await;
        }

        if was_running {
            if let Err(e) = self.coordinator.unregister(&agent_id).await {
                tracing::warn!("failed to unregister: {}", e);
            }
        }

        self.executor.shutdown().await;
        {
            let mut state = self.state();
            if state.task.is_none() {
                state.identity.status = AgentStatus::Offline;
            }
        }

        tracing::info!("agent stopped");
        self.reporter
            .emit(SwarmEvent::new(SwarmEventKind::AgentStopped, &name));
    }

    /// Run one task.
    ///
    /// Returns `Err(TaskExecution)` only when the agent is not idle; every
    /// accepted task yields exactly one [`TaskResult`], completed or failed.
    /// Dropping this future mid-task reports the task as cancelled instead.
    #[tracing::instrument(skip(self, context), fields(task_id = %context.task_id))]
    pub async fn execute_task(&self, context: TaskContext) -> Result<TaskResult> {
        let agent_id = {
            let mut state = self.state();
            if state.identity.status != AgentStatus::Idle {
                return Err(WorkerError::TaskExecution {
                    task_id: context.task_id.clone(),
                    agent_id: state.identity.id.clone(),
                    status: state.identity.status,
                });
            }
            state.identity.status = AgentStatus::Busy;
            state.identity.current_task = Some(context.task_id.clone());
            state.task = Some(context.clone());
            state.task_started = Some(Instant::now());
            state.identity.id.clone()
        };
        let mut busy = BusyGuard {
            state: Arc::clone(&self.state),
            stopped: Arc::clone(&self.stopped),
            reporter: self.reporter.clone(),
            finished: false,
        };

        let started = Instant::now();
        let task_id = context.task_id.clone();
        self.reporter.task_started(&task_id).await;

        let outcome = self.run_executor(&context).await;
        let execution_time = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(output) => {
                self.record(true, execution_time);
                TaskResult::completed(&task_id, &agent_id, output, execution_time)
            }
            Err(e) => {
                self.record(false, execution_time);
                TaskResult::failed(&task_id, &agent_id, &format!("{:#}", e), execution_time)
            }
        };
        busy.finish();

        if result.is_success() {
            self.reporter.task_completed(&result).await;
        } else {
            self.reporter.task_failed(&result).await;
        }
        Ok(result)
    }

    /// Executor call with panic capture and the optional ceiling
    async fn run_executor(&self, context: &TaskContext) -> anyhow::Result<Value> {
        let call = AssertUnwindSafe(self.executor.execute(context)).catch_unwind();

        let caught = match self.config.task_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                Ok(caught) => caught,
                Err(_) => return Err(anyhow::anyhow!("Task timed out after {}s", secs)),
            },
            None => call.await,
        };

        caught.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("executor panicked: {}", message))
        })
    }

    fn record(&self, success: bool, execution_time: f64) {
        self.state()
            .identity
            .performance
            .record(success, execution_time);
    }

    /// New message from this agent
    pub fn message(&self, content: Value) -> CoordinationMessage {
        CoordinationMessage::new(self.id(), content)
    }

    /// Best-effort send; returns whether the store accepted it
    pub async fn send_message(&self, message: CoordinationMessage) -> bool {
        let sent = self.messenger.send(&message).await;
        if sent {
            let name = self.state().identity.name.clone();
            self.reporter.emit(
                SwarmEvent::new(SwarmEventKind::MessageSent, &name).with_data(json!({
                    "to": message.to_agent,
                    "message_type": message.message_type,
                })),
            );
        }
        sent
    }

    pub async fn get_messages(&self, from_agent: Option<&str>) -> Vec<CoordinationMessage> {
        self.messenger.receive(from_agent).await
    }
}
