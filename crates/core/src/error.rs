//! # Worker Errors
//!
//! Error taxonomy for the agent runtime. Every variant carries a stable
//! code for the coordinator and a detail map for structured logs.

use std::collections::HashMap;

use serde_json::{json, Value};
use thiserror::Error;

use crate::models::AgentStatus;

/// Errors raised by the agent runtime
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Task offered to an agent that is not idle
    #[error("Agent {agent_id} is not idle (status: {status}), rejected task {task_id}")]
    TaskExecution {
        task_id: String,
        agent_id: String,
        status: AgentStatus,
    },

    /// Coordinator refused or could not be reached during startup
    #[error("Failed to register agent: {0}")]
    Registration(String),

    #[error("Coordinator request failed: {0}")]
    Coordinator(String),

    /// Assistant integration failure
    #[error("Assistant error: {0}")]
    Assistant(String),

    /// Environment setup failure (work dirs, subprocess spawn)
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Coordination store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl WorkerError {
    /// Stable error code reported to the coordinator
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::TaskExecution { .. } => "TASK_EXECUTION_ERROR",
            WorkerError::Assistant(_) => "ASSISTANT_ERROR",
            WorkerError::Environment(_) => "ENVIRONMENT_ERROR",
            _ => "WORKER_ERROR",
        }
    }

    /// Structured details for logs and API responses
    pub fn details(&self) -> HashMap<String, Value> {
        let mut details = HashMap::new();
        match self {
            WorkerError::TaskExecution {
                task_id,
                agent_id,
                status,
            } => {
                details.insert("task_id".to_string(), json!(task_id));
                details.insert("agent_id".to_string(), json!(agent_id));
                details.insert("status".to_string(), json!(status));
            }
            WorkerError::Http(e) => {
                if let Some(status) = e.status() {
                    details.insert("http_status".to_string(), json!(status.as_u16()));
                }
            }
            _ => {}
        }
        details
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_execution_error_carries_task_and_status() {
        let err = WorkerError::TaskExecution {
            task_id: "task-1".to_string(),
            agent_id: "agent-1".to_string(),
            status: AgentStatus::Busy,
        };

        assert_eq!(err.code(), "TASK_EXECUTION_ERROR");
        assert!(err.to_string().contains("task-1"));
        assert!(err.to_string().contains("busy"));

        let details = err.details();
        assert_eq!(details["task_id"], json!("task-1"));
        assert_eq!(details["status"], json!("busy"));
    }

    #[test]
    fn test_codes_for_domain_variants() {
        assert_eq!(WorkerError::Assistant("x".into()).code(), "ASSISTANT_ERROR");
        assert_eq!(WorkerError::Environment("x".into()).code(), "ENVIRONMENT_ERROR");
        assert_eq!(WorkerError::Registration("x".into()).code(), "WORKER_ERROR");
        assert!(WorkerError::Config("x".into()).details().is_empty());
    }
}
