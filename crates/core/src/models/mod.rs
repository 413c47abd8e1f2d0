//! # Data Models
//!
//! Agent identity and task records shared by every layer of the runtime.

pub mod agent;
pub mod task;

pub use agent::{
    AgentCapabilities, AgentIdentity, AgentStatus, AgentType, ComplexityTier, PerformanceRecord,
};
pub use task::{CoordinationMessage, Problem, TaskContext, TaskResult, TaskStatus};
