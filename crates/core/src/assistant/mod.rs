//! # Assistant Integration
//!
//! Request/response contract for the external code assistant. The runtime
//! only depends on the [`Assistant`] trait so tests can swap in stubs.
//!
//! ```text
//! TaskExecutor ──► Assistant (trait)
//!                    ├── CliAssistant   one subprocess per call
//!                    ├── AssistantPool  bounded set of instances
//!                    └── DisabledAssistant
//! ```

pub mod cli;
pub mod pool;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use cli::{CliAssistant, FlowHooks};
pub use pool::{AssistantPool, InstanceGuard, PoolStatus};

use crate::config::AssistantConfig;

/// Operations the assistant CLI understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantOperation {
    Analyze,
    Generate,
    Validate,
    Optimize,
    Test,
    Fix,
    Solve,
}

impl AssistantOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantOperation::Analyze => "analyze",
            AssistantOperation::Generate => "generate",
            AssistantOperation::Validate => "validate",
            AssistantOperation::Optimize => "optimize",
            AssistantOperation::Test => "test",
            AssistantOperation::Fix => "fix",
            AssistantOperation::Solve => "solve",
        }
    }
}

impl fmt::Display for AssistantOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub operation: AssistantOperation,
    pub code: Option<String>,
    pub requirements: Option<String>,
    /// Operation parameters (file, issue, framework, ...)
    #[serde(default)]
    pub context: Map<String, Value>,
    pub language: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl AssistantRequest {
    pub fn new(operation: AssistantOperation) -> Self {
        Self {
            operation,
            code: None,
            requirements: None,
            context: Map::new(),
            language: "python".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Flatten into the parameter object the CLI command builder reads
    pub fn params(&self) -> Value {
        let mut params = self.context.clone();
        if let Some(code) = &self.code {
            params.insert("code".to_string(), json!(code));
        }
        if let Some(requirements) = &self.requirements {
            params.insert("requirements".to_string(), json!(requirements));
        }
        params.insert("language".to_string(), json!(self.language));
        Value::Object(params)
    }
}

/// Outcome of one assistant call. Failures are data, never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Seconds
    pub execution_time: f64,
}

impl AssistantResponse {
    pub fn ok(result: Value, execution_time: f64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            metadata: HashMap::new(),
            execution_time,
        }
    }

    pub fn failure(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
            execution_time,
        }
    }

    /// Interpret raw CLI JSON: `{"success": false, "error": ..}` is a failure
    pub fn from_output(output: Value, execution_time: f64) -> Self {
        if output.get("success").and_then(Value::as_bool) == Some(false) {
            let error = output
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("assistant operation failed")
                .to_string();
            return Self::failure(error, execution_time);
        }
        Self::ok(output, execution_time)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Wire shape: the raw result, or `{"error": .., "success": false}`
    pub fn to_json(&self) -> Value {
        if self.success {
            self.result.clone().unwrap_or_else(|| json!({ "success": true }))
        } else {
            json!({
                "error": self.error.clone().unwrap_or_default(),
                "success": false,
            })
        }
    }
}

/// External code assistant
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn call(&self, request: AssistantRequest) -> AssistantResponse;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when the integration is switched off
pub struct DisabledAssistant;

#[async_trait]
impl Assistant for DisabledAssistant {
    async fn call(&self, _request: AssistantRequest) -> AssistantResponse {
        AssistantResponse::failure("assistant integration is disabled", 0.0)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the assistant described by `config`
pub fn assistant_from_config(config: &AssistantConfig) -> Arc<dyn Assistant> {
    if !config.enabled {
        return Arc::new(DisabledAssistant);
    }
    Arc::new(CliAssistant::new(config.command.clone()).with_auth_token(config.auth_token.clone()))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_assistant_fails_softly() {
        let response = DisabledAssistant
            .call(AssistantRequest::new(AssistantOperation::Analyze))
            .await;

        assert!(!response.success);
        assert_eq!(
            response.to_json(),
            json!({"error": "assistant integration is disabled", "success": false})
        );
    }

    #[test]
    fn test_from_output_detects_reported_failure() {
        let response =
            AssistantResponse::from_output(json!({"success": false, "error": "boom"}), 0.5);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("boom"));

        let response = AssistantResponse::from_output(json!({"issues": []}), 0.5);
        assert!(response.success);
        assert_eq!(response.to_json(), json!({"issues": []}));
    }

    #[test]
    fn test_params_flatten_request() {
        let request = AssistantRequest::new(AssistantOperation::Fix)
            .with_code("print(1)")
            .with_param("file", "main.py")
            .with_param("issue", "off by one");

        let params = request.params();
        assert_eq!(params["file"], "main.py");
        assert_eq!(params["code"], "print(1)");
        assert_eq!(params["language"], "python");
    }
}
