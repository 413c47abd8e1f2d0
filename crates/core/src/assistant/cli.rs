//! # Assistant CLI
//!
//! Runs the assistant as a subprocess and turns its stdout into JSON.
//! Every operation maps to a fixed argument layout; context that does not
//! fit on a command line is written to a scratch file first.
//!
//! Subprocesses are spawned with `kill_on_drop`, so a timed-out call never
//! leaves the child running.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Assistant, AssistantOperation, AssistantRequest, AssistantResponse};
use crate::error::{Result, WorkerError};
use crate::models::AgentType;

/// Build the CLI arguments for `operation`, writing scratch files into
/// `work_dir` where the operation needs them.
pub async fn build_args(
    operation: AssistantOperation,
    params: &Value,
    work_dir: &Path,
) -> Result<Vec<String>> {
    let args = match operation {
        AssistantOperation::Analyze
        | AssistantOperation::Validate
        | AssistantOperation::Optimize => {
            let file = resolve_file(params, work_dir).await?;
            vec![operation.as_str().to_string(), file, "--json".to_string()]
        }
        AssistantOperation::Generate => {
            let context_file = work_dir.join("context.md");
            tokio::fs::write(&context_file, render_context(params)).await?;
            vec![
                "chat".to_string(),
                "--file".to_string(),
                context_file.display().to_string(),
                "--json".to_string(),
            ]
        }
        AssistantOperation::Test => {
            let file = resolve_file(params, work_dir).await?;
            let framework = str_param(params, "framework").unwrap_or("pytest");
            vec![
                "test".to_string(),
                file,
                "--framework".to_string(),
                framework.to_string(),
                "--json".to_string(),
            ]
        }
        AssistantOperation::Fix => {
            let file = resolve_file(params, work_dir).await?;
            let issue = str_param(params, "issue").unwrap_or("");
            vec![
                "fix".to_string(),
                file,
                "--issue".to_string(),
                issue.to_string(),
                "--json".to_string(),
            ]
        }
        AssistantOperation::Solve => {
            let problem_file = work_dir.join("problem.md");
            tokio::fs::write(&problem_file, render_problem(params)).await?;
            vec![
                "solve".to_string(),
                problem_file.display().to_string(),
                "--output-dir".to_string(),
                work_dir.display().to_string(),
                "--json".to_string(),
            ]
        }
    };
    Ok(args)
}

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Target file for file-based operations. Inline code is spilled to disk.
async fn resolve_file(params: &Value, work_dir: &Path) -> Result<String> {
    if let Some(file) = str_param(params, "file") {
        return Ok(file.to_string());
    }
    if let Some(code) = str_param(params, "code") {
        let ext = extension_for(str_param(params, "language").unwrap_or("python"));
        let path = work_dir.join(format!("snippet.{}", ext));
        tokio::fs::write(&path, code).await?;
        return Ok(path.display().to_string());
    }
    Err(WorkerError::Assistant(
        "operation needs a 'file' or 'code' parameter".to_string(),
    ))
}

fn extension_for(language: &str) -> &'static str {
    match language {
        "javascript" => "js",
        "typescript" => "ts",
        "java" => "java",
        "go" => "go",
        "rust" => "rs",
        "ruby" => "rb",
        "cpp" => "cpp",
        _ => "py",
    }
}

fn render_context(params: &Value) -> String {
    let mut doc = String::from("# Code Generation Request\n\n");
    if let Some(requirements) = str_param(params, "requirements") {
        doc.push_str("## Requirements\n");
        doc.push_str(requirements);
        doc.push_str("\n\n");
    }
    if let Some(code) = str_param(params, "code") {
        let language = str_param(params, "language").unwrap_or("python");
        doc.push_str(&format!("## Existing Code\n```{}\n{}\n```\n\n", language, code));
    }
    if let Some(context) = params.get("context") {
        doc.push_str("## Context\n");
        doc.push_str(&serde_json::to_string_pretty(context).unwrap_or_default());
        doc.push('\n');
    }
    doc
}

fn render_problem(params: &Value) -> String {
    let description = str_param(params, "description").unwrap_or("");
    let files: Vec<&str> = params
        .get("files")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut doc = format!("# Problem\n\n{}\n\n## Files\n", description);
    for file in files {
        doc.push_str(&format!("- {}\n", file));
    }
    doc
}

/// Run `command` + `args` and parse stdout as JSON.
///
/// `Err` carries a human-readable failure; callers turn it into the
/// `{"error": .., "success": false}` shape. Plain-text stdout is accepted
/// only when `allow_text` is set.
pub async fn run_json_command(
    command: &[String],
    args: &[String],
    envs: &HashMap<String, String>,
    cwd: Option<&Path>,
    timeout: Duration,
    allow_text: bool,
) -> std::result::Result<Value, String> {
    let (program, leading) = command
        .split_first()
        .ok_or_else(|| "assistant command is empty".to_string())?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(leading)
        .args(args)
        .envs(envs)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .map_err(|e| format!("failed to spawn '{}': {}", program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to wait for '{}': {}", program, e)),
        Err(_) => {
            tracing::warn!(program = %program, ?timeout, "assistant call timed out");
            return Err("Operation timed out".to_string());
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(if stderr.is_empty() {
            format!("'{}' exited with {}", program, output.status)
        } else {
            stderr
        });
    }

    parse_output(&String::from_utf8_lossy(&output.stdout), allow_text)
}

/// Parse CLI stdout. Tries the whole text, then the last non-empty line
/// (tools often log before printing the JSON result).
pub fn parse_output(stdout: &str, allow_text: bool) -> std::result::Result<Value, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(json!({ "success": true }));
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    if let Some(last) = trimmed.lines().rev().find(|l| !l.trim().is_empty()) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(last.trim()) {
            return Ok(value);
        }
    }
    if allow_text {
        return Ok(json!({ "output": trimmed, "success": true }));
    }
    let preview: String = trimmed.chars().take(200).collect();
    Err(format!("unparsable assistant output: {}", preview))
}

/// One subprocess per call, each in a fresh scratch directory
pub struct CliAssistant {
    command: Vec<String>,
    auth_token: Option<String>,
    env: HashMap<String, String>,
}

impl CliAssistant {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            auth_token: None,
            env: HashMap::new(),
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    fn envs(&self) -> HashMap<String, String> {
        let mut envs = self.env.clone();
        envs.insert("CLAUDE_HEADLESS".to_string(), "true".to_string());
        if let Some(token) = &self.auth_token {
            envs.insert("CLAUDE_AUTH_TOKEN".to_string(), token.clone());
        }
        envs
    }
}

#[async_trait]
impl Assistant for CliAssistant {
    #[tracing::instrument(skip(self, request), fields(operation = %request.operation))]
    async fn call(&self, request: AssistantRequest) -> AssistantResponse {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_secs_f64();

        let scratch = match tempfile::Builder::new().prefix("hive-assistant-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return AssistantResponse::failure(format!("failed to create scratch dir: {}", e), 0.0)
            }
        };

        let params = request.params();
        let args = match build_args(request.operation, &params, scratch.path()).await {
            Ok(args) => args,
            Err(e) => return AssistantResponse::failure(e.to_string(), elapsed()),
        };
        let cwd = str_param(&params, "working_dir").map(Path::new);

        let allow_text = request.operation == AssistantOperation::Generate;
        match run_json_command(&self.command, &args, &self.envs(), cwd, request.timeout, allow_text)
            .await
        {
            Ok(output) => AssistantResponse::from_output(output, elapsed())
                .with_metadata("operation", json!(request.operation)),
            Err(error) => AssistantResponse::failure(error, elapsed()),
        }
    }
}

/// Pre/post task notifications sent through the flow CLI. Always best-effort.
#[derive(Clone)]
pub struct FlowHooks {
    command: Vec<String>,
    agent_id: String,
    agent_type: AgentType,
    timeout: Duration,
}

impl FlowHooks {
    pub fn new(command: Vec<String>, agent_id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            command,
            agent_id: agent_id.into(),
            agent_type,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Announce the agent to the flow runtime
    pub async fn agent_spawn(&self, name: &str) -> bool {
        let args = vec![
            "agent".to_string(),
            "spawn".to_string(),
            "--type".to_string(),
            self.agent_type.to_string(),
            "--name".to_string(),
            name.to_string(),
            "--json".to_string(),
        ];
        self.run("agent spawn", args).await
    }

    pub async fn pre_task(&self, description: &str) -> bool {
        self.hook("pre-task", description).await
    }

    pub async fn post_task(&self, description: &str) -> bool {
        self.hook("post-task", description).await
    }

    async fn hook(&self, kind: &str, description: &str) -> bool {
        let args = vec![
            "hooks".to_string(),
            kind.to_string(),
            "--description".to_string(),
            description.to_string(),
            "--agent-id".to_string(),
            self.agent_id.clone(),
            "--agent-type".to_string(),
            self.agent_type.to_string(),
            "--json".to_string(),
        ];
        self.run(kind, args).await
    }

    async fn run(&self, label: &str, args: Vec<String>) -> bool {
        match run_json_command(&self.command, &args, &HashMap::new(), None, self.timeout, true).await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, hook = label, "flow hook failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "sh".into()]
    }

    #[tokio::test]
    async fn test_build_args_per_operation() {
        let dir = tempfile::tempdir().unwrap();
        let params = json!({"file": "src/lib.py", "issue": "panics on empty input"});

        let args = build_args(AssistantOperation::Fix, &params, dir.path()).await.unwrap();
        assert_eq!(
            args,
            vec!["fix", "src/lib.py", "--issue", "panics on empty input", "--json"]
        );

        let args = build_args(AssistantOperation::Test, &params, dir.path()).await.unwrap();
        assert_eq!(args, vec!["test", "src/lib.py", "--framework", "pytest", "--json"]);

        let args = build_args(
            AssistantOperation::Solve,
            &json!({"description": "Fix it", "files": ["a.py"]}),
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(args[0], "solve");
        let problem = std::fs::read_to_string(dir.path().join("problem.md")).unwrap();
        assert!(problem.contains("- a.py"));
    }

    #[tokio::test]
    async fn test_inline_code_is_spilled_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let params = json!({"code": "const x = 1;", "language": "javascript"});

        let args = build_args(AssistantOperation::Analyze, &params, dir.path()).await.unwrap();
        assert!(args[1].ends_with("snippet.js"));
        assert!(build_args(AssistantOperation::Validate, &json!({}), dir.path())
            .await
            .is_err());
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("  ", false), Ok(json!({"success": true})));
        assert_eq!(
            parse_output("loading...\n{\"ok\": 1}\n", false),
            Ok(json!({"ok": 1}))
        );
        assert!(parse_output("plain words", false).is_err());
        assert_eq!(
            parse_output("plain words", true),
            Ok(json!({"output": "plain words", "success": true}))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let assistant = CliAssistant::new(sh("echo boom >&2; exit 3"));
        let response = assistant
            .call(AssistantRequest::new(AssistantOperation::Analyze).with_param("file", "x.py"))
            .await;

        assert!(!response.success);
        assert_eq!(response.to_json(), json!({"error": "boom", "success": false}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_passes_json_through() {
        let assistant = CliAssistant::new(sh(r#"echo "{\"args\": \"$1 $3\"}""#))
            .with_auth_token(Some("secret".into()));
        let response = assistant
            .call(AssistantRequest::new(AssistantOperation::Optimize).with_param("file", "x.py"))
            .await;

        assert!(response.success);
        assert_eq!(response.to_json(), json!({"args": "optimize --json"}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flow_hooks_are_best_effort() {
        let ok = FlowHooks::new(sh("echo '{}'"), "agent-1", AgentType::Coder);
        assert!(ok.pre_task("Starting task t-1").await);

        let missing = FlowHooks::new(vec!["/nonexistent/flow".into()], "agent-1", AgentType::Coder);
        assert!(!missing.post_task("Completed task t-1").await);
    }
}
