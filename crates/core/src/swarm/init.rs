//! # Agent Initialization
//!
//! Wires a [`SwarmAgent`] from a [`WorkerConfig`]: coordinator client,
//! coordination store, assistant, optional instance pool and executor.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::agent::SwarmAgent;
use super::coordinator::{CoordinatorApi, HttpCoordinator, LocalCoordinator};
use super::events::SwarmEvent;
use super::pipeline::PipelineAgents;
use crate::assistant::{assistant_from_config, AssistantPool};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::memory::{open_store, CoordinationStore};
use crate::models::AgentType;
use crate::skills::create_executor;

/// A built agent plus the shared pieces callers may want to inspect
pub struct AgentRuntime {
    pub agent: Arc<SwarmAgent>,
    /// Present for coders with the assistant enabled
    pub pool: Option<AssistantPool>,
    pub store: Arc<dyn CoordinationStore>,
}

/// Builder for one agent process
pub struct AgentBuilder {
    config: WorkerConfig,
    coordinator: Option<Arc<dyn CoordinatorApi>>,
    store: Option<Arc<dyn CoordinationStore>>,
    events: Option<mpsc::Sender<SwarmEvent>>,
}

impl AgentBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            coordinator: None,
            store: None,
            events: None,
        }
    }

    /// Use `coordinator` instead of the HTTP client for `coordinator_url`
    pub fn with_coordinator(mut self, coordinator: Arc<dyn CoordinatorApi>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Skip the coordinator entirely (one-shot runs)
    pub fn local(self) -> Self {
        self.with_coordinator(Arc::new(LocalCoordinator))
    }

    /// Share an already opened store
    pub fn with_store(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    #[tracing::instrument(skip(self), fields(agent_type = %self.config.agent_type))]
    pub fn build(self) -> Result<AgentRuntime> {
        let config = self.config;
        config.validate()?;

        let coordinator = match self.coordinator {
            Some(coordinator) => coordinator,
            None => Arc::new(HttpCoordinator::new(&config.coordinator_url)?),
        };
        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.memory)?,
        };

        let assistant = assistant_from_config(&config.assistant);
        let pool = (config.agent_type == AgentType::Coder && config.assistant.enabled)
            .then(|| AssistantPool::from_config(&config.assistant, &config.environment));
        let executor = create_executor(config.agent_type, assistant, pool.clone())?;

        let hooks = (config.assistant.enabled && config.assistant.hooks_enabled)
            .then(|| config.assistant.flow_command.clone());

        let mut agent = SwarmAgent::new(config, executor, coordinator, Arc::clone(&store));
        if let Some(flow_command) = hooks {
            agent = agent.with_flow_hooks(flow_command);
        }
        if let Some(tx) = self.events {
            agent = agent.with_event_channel(tx);
        }

        tracing::debug!(agent_id = %agent.id(), pooled = pool.is_some(), "agent built");
        Ok(AgentRuntime {
            agent: Arc::new(agent),
            pool,
            store,
        })
    }
}

/// Agent that registers with the coordinator at `config.coordinator_url`
pub fn build_agent(config: WorkerConfig) -> Result<AgentRuntime> {
    AgentBuilder::new(config).build()
}

/// Researcher, coder and tester sharing one store, with no coordinator
pub fn build_pipeline_agents(config: &WorkerConfig) -> Result<PipelineAgents> {
    let store = open_store(&config.memory)?;
    let build = |agent_type: AgentType| -> Result<Arc<SwarmAgent>> {
        let mut config = config.clone();
        config.agent_type = agent_type;
        config.agent_id = None;
        config.agent_name = None;
        let runtime = AgentBuilder::new(config)
            .local()
            .with_store(Arc::clone(&store))
            .build()?;
        Ok(runtime.agent)
    };

    Ok(PipelineAgents {
        researcher: build(AgentType::Researcher)?,
        coder: build(AgentType::Coder)?,
        tester: build(AgentType::Tester)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryBackend;
    use crate::error::WorkerError;
    use crate::models::AgentStatus;
    use crate::swarm::events::SwarmEventKind;
    use tokio_test::assert_ok;

    fn offline_config(agent_type: AgentType) -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.agent_type = agent_type;
        config.assistant.enabled = false;
        config.memory.backend = MemoryBackend::InMemory;
        config
    }

    #[test]
    fn test_build_uses_configured_identity() {
        let mut config = offline_config(AgentType::Tester);
        config.agent_id = Some("tester-7".to_string());

        let runtime = assert_ok!(AgentBuilder::new(config).local().build());
        let identity = runtime.agent.identity();
        assert_eq!(identity.id, "tester-7");
        assert_eq!(identity.agent_type, AgentType::Tester);
        assert_eq!(identity.status, AgentStatus::Idle);
        assert!(runtime.pool.is_none());
    }

    #[test]
    fn test_coder_gets_pool_when_assistant_enabled() {
        let mut config = offline_config(AgentType::Coder);
        config.assistant.enabled = true;
        config.assistant.hooks_enabled = false;
        config.assistant.max_instances = 3;

        let runtime = AgentBuilder::new(config).local().build().unwrap();
        let status = runtime.pool.unwrap().status();
        assert_eq!(status.max_instances, 3);
        assert_eq!(status.active_instances, 0);
    }

    #[test]
    fn test_reviewer_has_no_executor() {
        let result = build_agent(offline_config(AgentType::Reviewer));
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = offline_config(AgentType::Coder);
        config.max_concurrent_tasks = 4;
        assert!(AgentBuilder::new(config).local().build().is_err());
    }

    #[test]
    fn test_pipeline_agents_have_distinct_roles() {
        let agents = assert_ok!(build_pipeline_agents(&offline_config(AgentType::Coder)));
        assert_eq!(agents.researcher.identity().agent_type, AgentType::Researcher);
        assert_eq!(agents.coder.identity().agent_type, AgentType::Coder);
        assert_eq!(agents.tester.identity().agent_type, AgentType::Tester);
        assert_ne!(agents.coder.id(), agents.tester.id());
    }

    #[tokio::test]
    async fn test_events_reach_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let runtime = AgentBuilder::new(offline_config(AgentType::Researcher))
            .local()
            .with_event_channel(tx)
            .build()
            .unwrap();

        runtime.agent.start().await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SwarmEventKind::AgentStarted);

        runtime.agent.stop().await;
        assert_eq!(runtime.agent.status(), AgentStatus::Offline);
    }
}
