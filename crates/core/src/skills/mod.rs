//! # Hive Skills
//!
//! Specialized task executors plugged into the agent engine.
//!
//! ## Architecture
//!
//! ```text
//! SwarmAgent (lifecycle, admission, reporting)
//!   └── TaskExecutor (trait)
//!         ├── ResearcherSkill  problem analysis
//!         ├── CoderSkill       implementation plan and generated code
//!         └── TesterSkill      test suite and results
//! ```
//!
//! Executors report faults as `anyhow::Error`; the engine turns them into
//! failed task results. Skills chain through `previous_results`: the coder
//! reads `"research"`, the tester reads `"code"`.

pub mod helpers;
pub mod templates;

pub mod coder_skill;
pub mod researcher_skill;
pub mod tester_skill;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use coder_skill::{CodeSolution, CoderSkill};
pub use researcher_skill::ResearcherSkill;
pub use tester_skill::TesterSkill;

use crate::assistant::{Assistant, AssistantPool};
use crate::error::{Result, WorkerError};
use crate::models::{AgentCapabilities, AgentType, TaskContext};

/// Type-specific work performed for one task
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn agent_type(&self) -> AgentType;

    fn capabilities(&self) -> AgentCapabilities;

    async fn execute(&self, context: &TaskContext) -> anyhow::Result<Value>;

    /// Release executor resources when the agent stops
    async fn shutdown(&self) {}
}

/// Build the executor for `agent_type`.
///
/// Only researcher, coder and tester have executors; other types are a
/// configuration error.
pub fn create_executor(
    agent_type: AgentType,
    assistant: Arc<dyn Assistant>,
    pool: Option<AssistantPool>,
) -> Result<Arc<dyn TaskExecutor>> {
    match agent_type {
        AgentType::Researcher => Ok(Arc::new(ResearcherSkill::new(assistant))),
        AgentType::Coder => {
            let mut coder = CoderSkill::new(assistant);
            if let Some(pool) = pool {
                coder = coder.with_pool(pool);
            }
            Ok(Arc::new(coder))
        }
        AgentType::Tester => Ok(Arc::new(TesterSkill::new(assistant))),
        other => Err(WorkerError::Config(format!(
            "no executor for agent type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::DisabledAssistant;

    #[test]
    fn test_create_executor() {
        let assistant: Arc<dyn Assistant> = Arc::new(DisabledAssistant);
        for agent_type in [AgentType::Researcher, AgentType::Coder, AgentType::Tester] {
            let executor = create_executor(agent_type, assistant.clone(), None).unwrap();
            assert_eq!(executor.agent_type(), agent_type);
            assert!(!executor.capabilities().languages.is_empty());
        }
    }

    #[test]
    fn test_unsupported_type_is_config_error() {
        let err = create_executor(AgentType::Reviewer, Arc::new(DisabledAssistant), None)
            .err()
            .unwrap();
        assert!(matches!(err, WorkerError::Config(_)));
        assert!(err.to_string().contains("reviewer"));
    }
}
