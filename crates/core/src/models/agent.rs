//! # Agent Identity
//!
//! Identity, capability and performance records for a single agent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of agent roles in the swarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Researcher,
    Architect,
    Coder,
    Tester,
    Reviewer,
    Coordinator,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Researcher => "researcher",
            AgentType::Architect => "architect",
            AgentType::Coder => "coder",
            AgentType::Tester => "tester",
            AgentType::Reviewer => "reviewer",
            AgentType::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "researcher" => Ok(AgentType::Researcher),
            "architect" => Ok(AgentType::Architect),
            "coder" => Ok(AgentType::Coder),
            "tester" => Ok(AgentType::Tester),
            "reviewer" => Ok(AgentType::Reviewer),
            "coordinator" => Ok(AgentType::Coordinator),
            other => Err(format!("unknown agent type '{}'", other)),
        }
    }
}

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Largest problem size an agent claims to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    #[default]
    Medium,
    High,
}

/// What an agent declares it can work on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub max_complexity: ComplexityTier,
}

impl AgentCapabilities {
    pub fn new<S: Into<String>>(languages: impl IntoIterator<Item = S>) -> Self {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_frameworks<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.frameworks = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_domains<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.domains = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.tools = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_complexity(mut self, tier: ComplexityTier) -> Self {
        self.max_complexity = tier;
        self
    }
}

/// Rolling performance statistics.
///
/// `success_rate` and `average_time` are updated online from the previous
/// values and `tasks_completed`; no separate success counter exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub tasks_completed: u64,
    /// Percentage in `[0, 100]`
    pub success_rate: f64,
    /// Mean execution time in seconds
    pub average_time: f64,
    pub quality_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            success_rate: 100.0,
            average_time: 0.0,
            quality_score: 100.0,
            last_updated: Utc::now(),
        }
    }
}

impl PerformanceRecord {
    /// Fold one task outcome into the record.
    ///
    /// Prior successes are re-derived by rounding the previous rate, so the
    /// rate can drift from an exact count over long histories.
    pub fn record(&mut self, success: bool, execution_time: f64) {
        self.tasks_completed += 1;
        let n = self.tasks_completed as f64;

        let mut successes = (self.success_rate / 100.0 * (n - 1.0)).round();
        if success {
            successes += 1.0;
        }
        self.success_rate = successes / n * 100.0;

        let total_time = self.average_time * (n - 1.0) + execution_time;
        self.average_time = total_time / n;
        self.last_updated = Utc::now();
    }
}

/// Identity record owned by the agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub name: String,
    pub status: AgentStatus,
    pub capabilities: AgentCapabilities,
    pub performance: PerformanceRecord,
    pub current_task: Option<String>,
    pub coordinator_url: Option<String>,
}

impl AgentIdentity {
    /// Create an idle identity with a fresh id and a derived name
    pub fn new(agent_type: AgentType, capabilities: AgentCapabilities) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let name = default_name(agent_type, &id);
        Self {
            id,
            agent_type,
            name,
            status: AgentStatus::Idle,
            capabilities,
            performance: PerformanceRecord::default(),
            current_task: None,
            coordinator_url: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let renamed = self.name == default_name(self.agent_type, &self.id);
        self.id = id.into();
        if renamed {
            self.name = default_name(self.agent_type, &self.id);
        }
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_coordinator_url(mut self, url: impl Into<String>) -> Self {
        self.coordinator_url = Some(url.into());
        self
    }
}

fn default_name(agent_type: AgentType, id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("{}-{}", agent_type, short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_sequence() {
        let mut perf = PerformanceRecord::default();
        perf.record(true, 10.0);
        perf.record(false, 20.0);
        perf.record(true, 30.0);

        assert_eq!(perf.tasks_completed, 3);
        assert!((perf.average_time - 20.0).abs() < 1e-9);
        assert!((perf.success_rate - 66.67).abs() < 0.01);
    }

    #[test]
    fn test_first_failure_drops_rate_to_zero() {
        let mut perf = PerformanceRecord::default();
        perf.record(false, 4.0);

        assert_eq!(perf.success_rate, 0.0);
        assert_eq!(perf.average_time, 4.0);
    }

    #[test]
    fn test_identity_name_derived_from_type_and_id() {
        let identity = AgentIdentity::new(AgentType::Coder, AgentCapabilities::default())
            .with_id("0123456789abcdef");

        assert_eq!(identity.name, "coder-01234567");
        assert_eq!(identity.status, AgentStatus::Idle);
        assert!(identity.current_task.is_none());
    }

    #[test]
    fn test_explicit_name_survives_id_change() {
        let identity = AgentIdentity::new(AgentType::Tester, AgentCapabilities::default())
            .with_name("qa-bot")
            .with_id("abc");

        assert_eq!(identity.name, "qa-bot");
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("Researcher".parse::<AgentType>(), Ok(AgentType::Researcher));
        assert!("janitor".parse::<AgentType>().is_err());
        assert_eq!(
            serde_json::to_string(&AgentType::Coordinator).unwrap(),
            "\"coordinator\""
        );
    }
}
