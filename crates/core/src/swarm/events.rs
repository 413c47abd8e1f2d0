//! # Swarm Events
//!
//! Lifecycle events an agent publishes to local observers (the worker API,
//! tests, the CLI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of swarm event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwarmEventKind {
    /// Registered with the coordinator and serving tasks
    AgentStarted,
    /// Unregistered and no longer serving tasks
    AgentStopped,
    /// Task accepted by the engine
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    /// In-flight task abandoned at shutdown or dropped by its caller
    TaskCancelled,
    /// Coordination message written to the store
    MessageSent,
    /// Heartbeat tick failed; the loop keeps running
    HeartbeatFailed,
}

/// An event in the swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SwarmEventKind,
    /// Agent that produced this event
    pub agent: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl SwarmEvent {
    pub fn new(kind: SwarmEventKind, agent: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            task_id: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = SwarmEvent::new(SwarmEventKind::TaskStarted, "coder-1234abcd")
            .with_task("task-001");

        assert_eq!(event.agent, "coder-1234abcd");
        assert_eq!(event.task_id, Some("task-001".to_string()));
        assert_eq!(
            serde_json::to_value(&event.kind).unwrap(),
            serde_json::json!("task_started")
        );
    }
}
