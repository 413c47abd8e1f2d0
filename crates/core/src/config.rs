//! # Worker Configuration
//!
//! Settings for one agent process. Values come from `.hive/config.json`,
//! then `HIVE_*` environment variables, then CLI flags (via
//! [`WorkerConfig::merge`]), later sources winning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};
use crate::logging::LogConfig;
use crate::models::AgentType;

pub const DEFAULT_CONFIG_PATH: &str = ".hive/config.json";

/// Top-level configuration for an agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub agent_type: AgentType,
    /// Fixed id; a fresh UUID is generated when unset
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub coordinator_url: String,
    /// Must be 1; the engine runs one task at a time
    pub max_concurrent_tasks: usize,
    /// Seconds between heartbeats
    pub heartbeat_interval: u64,
    /// Engine-level ceiling on a single task; unset means no ceiling
    pub task_timeout_secs: Option<u64>,
    pub assistant: AssistantConfig,
    pub memory: MemoryConfig,
    pub logging_level: String,
    pub log_json: bool,
    pub environment: EnvironmentConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            agent_type: AgentType::Coder,
            agent_id: None,
            agent_name: None,
            coordinator_url: "http://localhost:8080".to_string(),
            max_concurrent_tasks: 1,
            heartbeat_interval: 30,
            task_timeout_secs: None,
            assistant: AssistantConfig::default(),
            memory: MemoryConfig::default(),
            logging_level: "info".to_string(),
            log_json: false,
            environment: EnvironmentConfig::default(),
        }
    }
}

/// External assistant CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub enabled: bool,
    /// Remote endpoint handed to the CLI, if any
    pub endpoint: Option<String>,
    /// Program and leading args for code operations
    pub command: Vec<String>,
    /// Program and leading args for flow hooks
    pub flow_command: Vec<String>,
    pub auth_token: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    pub max_instances: usize,
    pub hooks_enabled: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            command: vec!["claude".to_string()],
            flow_command: vec!["npx".to_string(), "claude-flow@alpha".to_string()],
            auth_token: None,
            timeout_secs: 300,
            max_instances: 5,
            hooks_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    Sqlite,
    InMemory,
}

/// Coordination store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// `in_memory` never evicts; meant for tests and one-shot runs
    pub backend: MemoryBackend,
    pub path: PathBuf,
    pub namespace: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Sqlite,
            path: PathBuf::from(".hive/coordination.db"),
            namespace: "default".to_string(),
        }
    }
}

/// Execution environment handed to assistant subprocesses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Extra environment variables for every subprocess
    pub variables: HashMap<String, String>,
    /// Parent directory for instance work dirs (system temp dir when unset)
    pub work_root: Option<PathBuf>,
}

/// Partial settings layered over a loaded config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub agent_type: Option<AgentType>,
    pub coordinator_url: Option<String>,
    pub heartbeat_interval: Option<u64>,
    pub logging_level: Option<String>,
    pub log_json: Option<bool>,
    pub assistant_enabled: Option<bool>,
    pub assistant_token: Option<String>,
    pub memory_path: Option<PathBuf>,
    pub memory_namespace: Option<String>,
}

impl ConfigOverrides {
    /// Read `HIVE_*` variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from any key lookup. Unparsable values are skipped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).and_then(|v| match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => {
                    tracing::warn!(key, value = %v, "ignoring unparsable boolean");
                    None
                }
            })
        };

        Self {
            agent_type: lookup("HIVE_AGENT_TYPE").and_then(|v| match v.parse() {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("ignoring HIVE_AGENT_TYPE: {}", e);
                    None
                }
            }),
            coordinator_url: lookup("HIVE_COORDINATOR_URL"),
            heartbeat_interval: lookup("HIVE_HEARTBEAT_INTERVAL").and_then(|v| v.parse().ok()),
            logging_level: lookup("HIVE_LOG_LEVEL"),
            log_json: flag("HIVE_LOG_JSON"),
            assistant_enabled: flag("HIVE_ASSISTANT_ENABLED"),
            assistant_token: lookup("HIVE_ASSISTANT_TOKEN"),
            memory_path: lookup("HIVE_MEMORY_PATH").map(PathBuf::from),
            memory_namespace: lookup("HIVE_MEMORY_NAMESPACE"),
        }
    }
}

impl WorkerConfig {
    /// Load from `path` (or the default location), apply environment
    /// overrides and validate. A missing file yields defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content).map_err(|e| {
                WorkerError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.merge(ConfigOverrides::from_env());
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn merge(&mut self, other: ConfigOverrides) {
        if let Some(agent_type) = other.agent_type {
            self.agent_type = agent_type;
        }
        if let Some(url) = other.coordinator_url {
            self.coordinator_url = url;
        }
        if let Some(interval) = other.heartbeat_interval {
            self.heartbeat_interval = interval;
        }
        if let Some(level) = other.logging_level {
            self.logging_level = level;
        }
        if let Some(json) = other.log_json {
            self.log_json = json;
        }
        if let Some(enabled) = other.assistant_enabled {
            self.assistant.enabled = enabled;
        }
        if other.assistant_token.is_some() {
            self.assistant.auth_token = other.assistant_token;
        }
        if let Some(path) = other.memory_path {
            self.memory.path = path;
        }
        if let Some(namespace) = other.memory_namespace {
            self.memory.namespace = namespace;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks != 1 {
            return Err(WorkerError::Config(format!(
                "max_concurrent_tasks must be 1, got {}",
                self.max_concurrent_tasks
            )));
        }
        if self.heartbeat_interval == 0 {
            return Err(WorkerError::Config(
                "heartbeat_interval must be at least 1 second".to_string(),
            ));
        }
        if self.coordinator_url.trim().is_empty() {
            return Err(WorkerError::Config("coordinator_url is empty".to_string()));
        }
        if self.assistant.command.is_empty() || self.assistant.flow_command.is_empty() {
            return Err(WorkerError::Config(
                "assistant command and flow_command need a program".to_string(),
            ));
        }
        if self.assistant.max_instances == 0 {
            return Err(WorkerError::Config(
                "assistant.max_instances must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.logging_level.clone(),
            json: self.log_json,
        }
    }
}
