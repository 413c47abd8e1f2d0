//! # Task Records
//!
//! Inputs and outcomes of a single task attempt, plus the message envelope
//! agents exchange through the coordination store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agent::AgentType;

/// A benchmark problem as handed out by the orchestration layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<String>,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub constraints: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

impl Problem {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            difficulty: default_difficulty(),
            ..Default::default()
        }
    }

    pub fn with_files<S: Into<String>>(mut self, files: impl IntoIterator<Item = S>) -> Self {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_test_cases<S: Into<String>>(mut self, cases: impl IntoIterator<Item = S>) -> Self {
        self.test_cases = cases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }
}

/// Immutable input bundle for one task attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: String,
    pub problem: Problem,
    pub agent_type: AgentType,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub environment: HashMap<String, Value>,
    /// Outputs of earlier stages keyed by producer ("research", "code")
    #[serde(default)]
    pub previous_results: HashMap<String, Value>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, problem: Problem, agent_type: AgentType) -> Self {
        Self {
            task_id: task_id.into(),
            problem,
            agent_type,
            dependencies: Vec::new(),
            environment: HashMap::new(),
            previous_results: HashMap::new(),
        }
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn with_previous_result(mut self, producer: impl Into<String>, output: Value) -> Self {
        self.previous_results.insert(producer.into(), output);
        self
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: Value) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    pub fn previous(&self, producer: &str) -> Option<&Value> {
        self.previous_results.get(producer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one task attempt. Built once by the engine and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent_id: String,
    pub status: TaskStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub metrics: HashMap<String, Value>,
    /// Seconds
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    fn base(task_id: &str, agent_id: &str, status: TaskStatus, execution_time: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            status,
            output: None,
            error: None,
            artifacts: Vec::new(),
            metrics: HashMap::new(),
            execution_time: execution_time.max(0.0),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(task_id: &str, agent_id: &str, output: Value, execution_time: f64) -> Self {
        Self {
            output: Some(output),
            ..Self::base(task_id, agent_id, TaskStatus::Completed, execution_time)
        }
    }

    /// A failed result always carries a non-empty error
    pub fn failed(task_id: &str, agent_id: &str, error: &str, execution_time: f64) -> Self {
        let error = if error.trim().is_empty() {
            "task execution failed".to_string()
        } else {
            error.to_string()
        };
        Self {
            error: Some(error),
            ..Self::base(task_id, agent_id, TaskStatus::Failed, execution_time)
        }
    }

    pub fn cancelled(task_id: &str, agent_id: &str, execution_time: f64) -> Self {
        Self {
            error: Some("Task cancelled due to agent shutdown".to_string()),
            ..Self::base(task_id, agent_id, TaskStatus::Cancelled, execution_time)
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Advisory note exchanged between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMessage {
    pub from_agent: String,
    /// `None` broadcasts to every agent
    #[serde(default)]
    pub to_agent: Option<String>,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    pub content: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

fn default_message_type() -> String {
    "info".to_string()
}

impl CoordinationMessage {
    pub fn new(from_agent: impl Into<String>, content: Value) -> Self {
        Self {
            from_agent: from_agent.into(),
            to_agent: None,
            message_type: default_message_type(),
            content,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn to(mut self, agent_id: impl Into<String>) -> Self {
        self.to_agent = Some(agent_id.into());
        self
    }

    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
