//! # Task Reporter
//!
//! Fans task lifecycle notifications out to local observers (event
//! channel), the flow hooks and the coordination store. Every path is
//! best-effort: failures are logged and never reach the engine.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;

use super::events::{SwarmEvent, SwarmEventKind};
use crate::assistant::FlowHooks;
use crate::memory::CoordinationStore;
use crate::models::TaskResult;

pub fn result_key(agent_id: &str, task_id: &str) -> String {
    format!("agent/{}/tasks/{}/result", agent_id, task_id)
}

#[derive(Clone)]
pub struct TaskReporter {
    agent_id: String,
    agent_name: String,
    store: Arc<dyn CoordinationStore>,
    hooks: Option<FlowHooks>,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
}

impl TaskReporter {
    pub fn new(agent_id: &str, agent_name: &str, store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            store,
            hooks: None,
            event_tx: None,
        }
    }

    pub fn with_hooks(mut self, hooks: FlowHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn hooks(&self) -> Option<&FlowHooks> {
        self.hooks.as_ref()
    }

    /// Publish an event without ever blocking the caller
    pub fn emit(&self, event: SwarmEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(agent_id = %self.agent_id, "dropping swarm event: {}", e);
            }
        }
    }

    fn event(&self, kind: SwarmEventKind) -> SwarmEvent {
        SwarmEvent::new(kind, &self.agent_name)
    }

    pub async fn task_started(&self, task_id: &str) {
        tracing::info!(agent_id = %self.agent_id, task_id, "task started");
        self.emit(self.event(SwarmEventKind::TaskStarted).with_task(task_id));
        if let Some(hooks) = &self.hooks {
            hooks.pre_task(&format!("Starting task {}", task_id)).await;
        }
    }

    pub async fn task_completed(&self, result: &TaskResult) {
        tracing::info!(
            agent_id = %self.agent_id,
            task_id = %result.task_id,
            execution_time = result.execution_time,
            "task completed"
        );
        self.emit(
            self.event(SwarmEventKind::TaskCompleted)
                .with_task(&result.task_id)
                .with_data(json!({ "execution_time": result.execution_time })),
        );
        if let Some(hooks) = &self.hooks {
            hooks
                .post_task(&format!("Completed task {}", result.task_id))
                .await;
        }
        self.store_result(result).await;
    }

    pub async fn task_failed(&self, result: &TaskResult) {
        let error = result.error.as_deref().unwrap_or_default();
        tracing::warn!(agent_id = %self.agent_id, task_id = %result.task_id, "task failed: {}", error);
        self.emit(
            self.event(SwarmEventKind::TaskFailed)
                .with_task(&result.task_id)
                .with_data(json!({ "error": error })),
        );
        if let Some(hooks) = &self.hooks {
            hooks
                .post_task(&format!("Failed task {}: {}", result.task_id, error))
                .await;
        }
    }

    pub async fn task_cancelled(&self, result: &TaskResult) {
        tracing::warn!(agent_id = %self.agent_id, task_id = %result.task_id, "task cancelled");
        self.emit(self.event(SwarmEventKind::TaskCancelled).with_task(&result.task_id));
        if let Some(hooks) = &self.hooks {
            hooks
                .post_task(&format!("Cancelled task {}", result.task_id))
                .await;
        }
    }

    pub fn heartbeat_failed(&self, consecutive_failures: u32, error: &str) {
        self.emit(
            self.event(SwarmEventKind::HeartbeatFailed).with_data(json!({
                "consecutive_failures": consecutive_failures,
                "error": error,
            })),
        );
    }

    async fn store_result(&self, result: &TaskResult) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(task_id = %result.task_id, "failed to encode task result: {}", e);
                return;
            }
        };
        let key = result_key(&self.agent_id, &result.task_id);
        let entry = json!({ "result": value, "timestamp": Utc::now().to_rfc3339() });
        if let Err(e) = self.store.store(&key, entry).await {
            tracing::warn!(key = %key, "failed to store task result: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn test_completed_result_is_stored_and_announced() {
        let store = Arc::new(InMemoryStore::new());
        let (tx, mut rx) = mpsc::channel(8);
        let reporter = TaskReporter::new("agent-1", "coder-agent-1", store.clone())
            .with_event_channel(tx);

        let result = TaskResult::completed("t-1", "agent-1", json!({"ok": true}), 1.5);
        reporter.task_started("t-1").await;
        reporter.task_completed(&result).await;

        assert_eq!(rx.recv().await.unwrap().kind, SwarmEventKind::TaskStarted);
        let done = rx.recv().await.unwrap();
        assert_eq!(done.kind, SwarmEventKind::TaskCompleted);
        assert_eq!(done.task_id.as_deref(), Some("t-1"));

        let stored = store.retrieve(&result_key("agent-1", "t-1")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["result"]["output"]["ok"], true);
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let reporter =
            TaskReporter::new("agent-1", "coder", Arc::new(InMemoryStore::new())).with_event_channel(tx);

        reporter.task_started("a").await;
        reporter.task_started("b").await;
        let result = TaskResult::failed("b", "agent-1", "boom", 0.1);
        reporter.task_failed(&result).await;
    }
}
