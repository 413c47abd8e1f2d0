//! # Researcher Skill
//!
//! Analyzes a problem before any code is written: what kind of change it
//! is, which files and technologies it touches, what it requires and how
//! hard it is likely to be.
//!
//! The analysis is local and heuristic. When the assistant is enabled its
//! `analyze` operation adds insights on top; assistant failures are logged
//! and never fail the task.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::helpers::{contains_any, detect_language, is_test_file, main_language, sentences, truncate};
use super::TaskExecutor;
use crate::assistant::{Assistant, AssistantOperation, AssistantRequest};
use crate::models::{AgentCapabilities, AgentType, ComplexityTier, Problem, TaskContext};

// ============================================================================
// Types
// ============================================================================

/// Kind of change a problem asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    BugFix,
    FeatureAddition,
    Refactoring,
    Optimization,
    ArchitectureChange,
    Enhancement,
}

impl ProblemType {
    /// First matching rule wins, in declaration order
    pub fn classify(description: &str) -> Self {
        let text = description.to_lowercase();
        if contains_any(&text, &["fix", "bug", "error", "issue"]) {
            ProblemType::BugFix
        } else if contains_any(&text, &["add", "implement", "create", "new"]) {
            ProblemType::FeatureAddition
        } else if contains_any(&text, &["refactor", "restructure", "reorganize"]) {
            ProblemType::Refactoring
        } else if contains_any(&text, &["optimize", "improve", "performance"]) {
            ProblemType::Optimization
        } else if contains_any(&text, &["design", "architecture", "structure"]) {
            ProblemType::ArchitectureChange
        } else {
            ProblemType::Enhancement
        }
    }

    /// Contribution to the complexity score
    pub fn weight(&self) -> u32 {
        match self {
            ProblemType::BugFix => 20,
            ProblemType::FeatureAddition => 40,
            ProblemType::Refactoring => 50,
            ProblemType::Optimization => 60,
            ProblemType::ArchitectureChange => 80,
            ProblemType::Enhancement => 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemAnalysis {
    pub keywords: Vec<String>,
    pub problem_type: ProblemType,
    pub technologies: Vec<String>,
    pub required_actions: Vec<String>,
    pub main_goal: String,
    pub constraints_mentioned: Vec<String>,
    /// Assistant insights; empty when the assistant is off or failed
    pub enhanced_analysis: Value,
    pub description_length: usize,
    pub complexity_indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryStructure {
    pub directories: Vec<String>,
    pub file_distribution: BTreeMap<String, usize>,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStructure {
    pub test_files: Vec<String>,
    pub test_directories: Vec<String>,
    pub has_tests: bool,
    /// Rough: 20 points per test file, capped at 100
    pub test_coverage_estimate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    pub repository: String,
    pub main_language: String,
    pub project_type: String,
    pub directory_structure: DirectoryStructure,
    pub configuration_files: Vec<String>,
    pub test_structure: TestStructure,
    pub documentation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Source,
    Test,
    Config,
    Documentation,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub language: String,
    pub category: FileCategory,
    pub complexity: ComplexityTier,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirements {
    pub functional: Vec<String>,
    pub non_functional: Vec<String>,
    pub testing: Vec<String>,
    pub constraints: HashMap<String, Value>,
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependencies {
    pub internal_dependencies: BTreeMap<String, Vec<String>>,
    pub external_dependencies: Vec<String>,
    pub dependency_graph: DependencyGraph,
    /// Dependencies shared by more than one file
    pub critical_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub level: ComplexityTier,
    pub score: u32,
    pub factors: Vec<String>,
    /// Minutes
    pub estimated_time: u32,
    pub recommended_agents: Vec<AgentType>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchMetadata {
    pub analyzer: String,
    pub analysis_version: String,
    pub confidence_score: f64,
}

/// Output of the researcher; the coder reads it as `previous_results["research"]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub problem_analysis: ProblemAnalysis,
    pub repository_analysis: RepositoryAnalysis,
    pub file_analysis: Vec<FileAnalysis>,
    pub requirements: Requirements,
    pub dependencies: Dependencies,
    pub complexity_assessment: ComplexityAssessment,
    pub recommendations: Vec<String>,
    pub metadata: ResearchMetadata,
}

// ============================================================================
// Skill
// ============================================================================

pub struct ResearcherSkill {
    assistant: Arc<dyn Assistant>,
}

impl ResearcherSkill {
    pub fn new(assistant: Arc<dyn Assistant>) -> Self {
        Self { assistant }
    }

    /// Full analysis of `problem`
    pub async fn run(&self, problem: &Problem) -> ResearchReport {
        let mut problem_analysis = analyze_description(&problem.description);
        problem_analysis.enhanced_analysis = self.enhance_description(&problem.description).await;

        let repository_analysis = analyze_repository(problem);

        let mut file_analysis = Vec::with_capacity(problem.files.len());
        for file in &problem.files {
            let mut analysis = analyze_file(file, &problem.description);
            self.enhance_file(&mut analysis, &problem.description).await;
            file_analysis.push(analysis);
        }

        let requirements = extract_requirements(problem);
        let dependencies = analyze_dependencies(problem, &file_analysis, &problem_analysis.technologies);
        let complexity_assessment = assess_complexity(&problem_analysis, file_analysis.len(), &requirements);
        let recommendations = recommendations(&problem_analysis, &complexity_assessment);

        ResearchReport {
            metadata: ResearchMetadata {
                analyzer: "researcher".to_string(),
                analysis_version: "1.0".to_string(),
                confidence_score: complexity_assessment.confidence,
            },
            problem_analysis,
            repository_analysis,
            file_analysis,
            requirements,
            dependencies,
            complexity_assessment,
            recommendations,
        }
    }

    async fn enhance_description(&self, description: &str) -> Value {
        if !self.assistant.is_enabled() {
            return json!({});
        }
        let request = AssistantRequest::new(AssistantOperation::Analyze)
            .with_code(description)
            .with_language("text")
            .with_param("analysis_type", "problem_description");
        let response = self.assistant.call(request).await;
        if response.success {
            response.result.unwrap_or_else(|| json!({}))
        } else {
            tracing::warn!(
                "assistant problem analysis failed: {}",
                response.error.unwrap_or_default()
            );
            json!({})
        }
    }

    async fn enhance_file(&self, analysis: &mut FileAnalysis, description: &str) {
        if !self.assistant.is_enabled() {
            return;
        }
        let request = AssistantRequest::new(AssistantOperation::Analyze)
            .with_language(analysis.language.clone())
            .with_param("file", analysis.file_path.clone())
            .with_param("problem_context", description);
        let response = self.assistant.call(request).await;
        if !response.success {
            tracing::warn!(
                file = %analysis.file_path,
                "assistant file analysis failed: {}",
                response.error.unwrap_or_default()
            );
            return;
        }

        let Some(result) = response.result else { return };
        let strings = |key: &str| -> Vec<String> {
            result
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        analysis.issues.extend(strings("issues"));
        analysis.suggestions.extend(strings("suggestions"));
        if let Some(metrics) = result.get("metrics").and_then(Value::as_object) {
            analysis
                .metrics
                .extend(metrics.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

#[async_trait]
impl TaskExecutor for ResearcherSkill {
    fn agent_type(&self) -> AgentType {
        AgentType::Researcher
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new(["python", "javascript", "typescript", "java", "cpp", "rust"])
            .with_frameworks(["django", "flask", "react", "vue", "spring", "express"])
            .with_domains(["algorithms", "data_structures", "web_development", "api_design"])
            .with_tools(["git", "static_analysis", "documentation", "requirements_analysis"])
            .with_max_complexity(ComplexityTier::High)
    }

    async fn execute(&self, context: &TaskContext) -> anyhow::Result<Value> {
        tracing::info!(problem_id = %context.problem.id, "starting problem analysis");
        let report = self.run(&context.problem).await;
        tracing::info!(
            problem_id = %context.problem.id,
            complexity = ?report.complexity_assessment.level,
            files_analyzed = report.file_analysis.len(),
            "problem analysis completed"
        );
        Ok(serde_json::to_value(report)?)
    }
}

// ============================================================================
// Problem description
// ============================================================================

const TECH_KEYWORDS: &[&str] = &[
    "algorithm", "api", "database", "function", "class", "method", "performance",
    "optimization", "bug", "error", "exception", "test", "validation", "security",
    "authentication", "authorization",
];

const ACTION_WORDS: &[&str] = &[
    "fix", "implement", "create", "add", "remove", "update", "modify", "optimize",
    "improve", "refactor", "test", "validate", "debug",
];

const CONSTRAINT_WORDS: &[&str] = &[
    "must", "should", "cannot", "required", "mandatory", "within", "timeout", "memory",
    "performance",
];

fn technology_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("python", r"\bpython\b|\.py\b"),
            ("javascript", r"\bjavascript\b|\.js\b"),
            ("typescript", r"\btypescript\b|\.ts\b"),
            ("react", r"\breact\b"),
            ("django", r"\bdjango\b"),
            ("flask", r"\bflask\b"),
            ("api", r"\bapi\b|endpoint|rest"),
            ("database", r"\bdatabase\b|sql|mongodb|redis"),
            ("web", r"\bweb\b|http|html|css"),
        ]
        .into_iter()
        .filter_map(|(tech, pattern)| Regex::new(pattern).ok().map(|re| (tech, re)))
        .collect()
    })
}

fn words_present(text: &str, words: &[&str]) -> Vec<String> {
    words
        .iter()
        .filter(|w| text.contains(*w))
        .map(|w| w.to_string())
        .collect()
}

pub fn analyze_description(description: &str) -> ProblemAnalysis {
    let lower = description.to_lowercase();

    let technologies = technology_patterns()
        .iter()
        .filter(|(_, re)| re.is_match(&lower))
        .map(|(tech, _)| tech.to_string())
        .collect();

    let main_goal = sentences(description)
        .first()
        .map(|s| s.to_string())
        .unwrap_or_else(|| truncate(description.trim(), 100).to_string());

    // One sentence per indicator; an indicator with no sentence is skipped
    let mut constraints_mentioned = Vec::new();
    for indicator in CONSTRAINT_WORDS {
        if let Some(sentence) = sentences(description)
            .into_iter()
            .find(|s| s.to_lowercase().contains(indicator))
        {
            constraints_mentioned.push(sentence.to_string());
        }
    }

    let mut complexity_indicators = Vec::new();
    if contains_any(&lower, &["multiple", "several", "many"]) {
        complexity_indicators.push("multiple_components".to_string());
    }
    if contains_any(&lower, &["complex", "complicated", "intricate"]) {
        complexity_indicators.push("inherent_complexity".to_string());
    }
    if contains_any(&lower, &["integration", "compatibility", "migration"]) {
        complexity_indicators.push("integration_complexity".to_string());
    }
    if description.split_whitespace().count() > 100 {
        complexity_indicators.push("detailed_specification".to_string());
    }

    ProblemAnalysis {
        keywords: words_present(&lower, TECH_KEYWORDS),
        problem_type: ProblemType::classify(description),
        technologies,
        required_actions: words_present(&lower, ACTION_WORDS),
        main_goal,
        constraints_mentioned,
        enhanced_analysis: json!({}),
        description_length: description.chars().count(),
        complexity_indicators,
    }
}

// ============================================================================
// Repository and files
// ============================================================================

const CONFIG_PATTERNS: &[&str] = &[
    "config", "settings", ".env", "package.json", "requirements.txt", "dockerfile",
    "docker-compose", "makefile", "setup.py", "pyproject.toml", "cargo.toml",
];

const DOC_PATTERNS: &[&str] = &["readme", "doc", "documentation", ".md", "changelog"];

fn lower_file_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_lowercase()
}

fn is_config_file(file_path: &str) -> bool {
    contains_any(&lower_file_name(file_path), CONFIG_PATTERNS)
}

fn is_doc_file(file_path: &str) -> bool {
    contains_any(&lower_file_name(file_path), DOC_PATTERNS)
}

pub fn categorize(file_path: &str) -> FileCategory {
    if is_test_file(file_path) {
        FileCategory::Test
    } else if is_config_file(file_path) {
        FileCategory::Config
    } else if is_doc_file(file_path) {
        FileCategory::Documentation
    } else if detect_language(file_path) != "unknown" {
        FileCategory::Source
    } else {
        FileCategory::Other
    }
}

fn project_type(files: &[String]) -> &'static str {
    let joined = files.join(" ").to_lowercase();
    let indicators: &[(&str, &[&str])] = &[
        ("web_application", &["index.html", "app.py", "server.js", "package.json"]),
        ("library", &["__init__.py", "setup.py", "lib/", "src/"]),
        ("api", &["api/", "routes/", "endpoints/", "swagger.json"]),
        ("cli_tool", &["main.py", "cli.py", "bin/"]),
        ("desktop_application", &["gui/"]),
    ];
    indicators
        .iter()
        .find(|(_, needles)| contains_any(&joined, needles))
        .map(|(kind, _)| *kind)
        .unwrap_or("unknown")
}

fn parent_dir(file_path: &str) -> Option<String> {
    Path::new(file_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
}

fn directory_structure(files: &[String]) -> DirectoryStructure {
    let mut file_distribution = BTreeMap::new();
    for dir in files.iter().filter_map(|f| parent_dir(f)) {
        *file_distribution.entry(dir).or_insert(0) += 1;
    }
    DirectoryStructure {
        directories: file_distribution.keys().cloned().collect(),
        max_depth: files
            .iter()
            .map(|f| Path::new(f).components().count())
            .max()
            .unwrap_or(0),
        file_distribution,
    }
}

fn test_structure(files: &[String]) -> TestStructure {
    let test_files: Vec<String> = files.iter().filter(|f| is_test_file(f)).cloned().collect();
    let test_directories: BTreeSet<String> = test_files
        .iter()
        .map(|f| parent_dir(f).unwrap_or_else(|| ".".to_string()))
        .collect();
    TestStructure {
        has_tests: !test_files.is_empty(),
        test_coverage_estimate: (test_files.len() as u32 * 20).min(100),
        test_directories: test_directories.into_iter().collect(),
        test_files,
    }
}

pub fn analyze_repository(problem: &Problem) -> RepositoryAnalysis {
    let files = &problem.files;
    RepositoryAnalysis {
        repository: problem.repository.clone(),
        main_language: main_language(files).to_string(),
        project_type: project_type(files).to_string(),
        directory_structure: directory_structure(files),
        configuration_files: files.iter().filter(|f| is_config_file(f)).cloned().collect(),
        test_structure: test_structure(files),
        documentation: files.iter().filter(|f| is_doc_file(f)).cloned().collect(),
    }
}

fn file_complexity(file_path: &str) -> ComplexityTier {
    let lower = file_path.to_lowercase();
    if contains_any(&lower, &["algorithm", "engine", "core", "complex", "advanced"]) {
        return ComplexityTier::High;
    }
    if contains_any(&lower, &["util", "helper", "simple", "basic", "config"]) {
        return ComplexityTier::Low;
    }
    match detect_language(file_path) {
        "json" | "yaml" => ComplexityTier::Low,
        _ if lower.ends_with(".txt") || lower.ends_with(".md") => ComplexityTier::Low,
        _ => ComplexityTier::Medium,
    }
}

pub fn analyze_file(file_path: &str, description: &str) -> FileAnalysis {
    let lower_path = file_path.to_lowercase();
    let lower_desc = description.to_lowercase();
    let language = detect_language(file_path);

    let mut issues = Vec::new();
    if lower_path.contains("test") && lower_desc.contains("bug") {
        issues.push("May need test case updates".to_string());
    }
    if language == "python" && lower_desc.contains("performance") {
        issues.push("Consider algorithm efficiency".to_string());
    }
    if lower_path.contains("config") && lower_desc.contains("security") {
        issues.push("Review security configurations".to_string());
    }

    let mut suggestions = Vec::new();
    if matches!(language, "python" | "javascript" | "typescript") {
        suggestions.push("Add comprehensive error handling".to_string());
        suggestions.push("Include input validation".to_string());
        suggestions.push("Add logging for debugging".to_string());
    }
    if lower_path.contains("test") {
        suggestions.push("Cover edge cases".to_string());
        suggestions.push("Add performance tests if applicable".to_string());
    }

    let mut dependencies = Vec::new();
    if language == "python" {
        if lower_path.contains("model") {
            dependencies.extend(["database".to_string(), "validation".to_string()]);
        } else if lower_path.contains("view") {
            dependencies.extend(["template".to_string(), "form".to_string()]);
        } else if lower_path.contains("test") {
            dependencies.extend(["testing_framework".to_string(), "fixtures".to_string()]);
        }
    }

    FileAnalysis {
        file_path: file_path.to_string(),
        language: language.to_string(),
        category: categorize(file_path),
        complexity: file_complexity(file_path),
        issues,
        suggestions,
        dependencies,
        metrics: Map::new(),
    }
}

// ============================================================================
// Requirements and dependencies
// ============================================================================

fn acceptance_criteria(description: &str) -> Vec<String> {
    static NUMBERED: OnceLock<Option<Regex>> = OnceLock::new();
    let numbered = NUMBERED.get_or_init(|| Regex::new(r"^\d+\.").ok());

    let listed: Vec<String> = description
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(['-', '*', '•'])
                || numbered.as_ref().is_some_and(|re| re.is_match(line))
        })
        .map(str::to_string)
        .collect();
    if !listed.is_empty() {
        return listed;
    }

    sentences(description)
        .into_iter()
        .filter(|s| s.to_lowercase().contains("should"))
        .map(str::to_string)
        .collect()
}

pub fn extract_requirements(problem: &Problem) -> Requirements {
    let description = &problem.description;
    let lower = description.to_lowercase();

    let functional = sentences(description)
        .into_iter()
        .filter(|s| {
            contains_any(
                &s.to_lowercase(),
                &["must", "should", "shall", "will", "need to", "required to"],
            )
        })
        .map(str::to_string)
        .collect();

    let mut non_functional = Vec::new();
    if contains_any(&lower, &["fast", "quick", "performance", "speed"]) {
        non_functional.push("Performance optimization required".to_string());
    }
    if contains_any(&lower, &["secure", "security", "safe", "protect"]) {
        non_functional.push("Security considerations required".to_string());
    }
    if contains_any(&lower, &["scale", "scalable", "large", "many users"]) {
        non_functional.push("Scalability considerations required".to_string());
    }
    let mut constraint_keys: Vec<&String> = problem.constraints.keys().collect();
    constraint_keys.sort();
    for key in constraint_keys {
        non_functional.push(format!("{}: {}", key, problem.constraints[key]));
    }

    let mut testing = Vec::new();
    if !problem.test_cases.is_empty() {
        testing.push(format!(
            "Must pass {} existing test cases",
            problem.test_cases.len()
        ));
    }
    if lower.contains("test") {
        testing.push("Additional test cases may be required".to_string());
    }

    Requirements {
        functional,
        non_functional,
        testing,
        constraints: problem.constraints.clone(),
        acceptance_criteria: acceptance_criteria(description),
    }
}

fn language_dependencies(language: &str) -> &'static [&'static str] {
    match language {
        "python" => &["requests", "numpy", "pandas"],
        "javascript" => &["axios", "lodash", "moment"],
        "typescript" => &["typescript", "@types/node"],
        _ => &[],
    }
}

pub fn analyze_dependencies(
    problem: &Problem,
    files: &[FileAnalysis],
    technologies: &[String],
) -> Dependencies {
    let internal_dependencies: BTreeMap<String, Vec<String>> = files
        .iter()
        .map(|f| (f.file_path.clone(), f.dependencies.clone()))
        .collect();

    let mut external: BTreeSet<String> = files
        .iter()
        .flat_map(|f| language_dependencies(&f.language).iter().map(|d| d.to_string()))
        .collect();
    // Frameworks named in the text or as the repository itself
    let repo_name = problem
        .repository
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_lowercase();
    for framework in ["django", "flask", "react"] {
        if technologies.iter().any(|t| t == framework) || repo_name == framework {
            external.insert(framework.to_string());
        }
    }

    let known = &internal_dependencies;
    let edges = known
        .iter()
        .flat_map(|(file, deps)| {
            deps.iter()
                .filter(move |d| known.contains_key(*d))
                .map(move |d| DependencyEdge {
                    from: file.clone(),
                    to: d.clone(),
                })
        })
        .collect();

    let mut counts: BTreeMap<&String, usize> = BTreeMap::new();
    for dep in internal_dependencies.values().flatten() {
        *counts.entry(dep).or_insert(0) += 1;
    }
    let critical_dependencies = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(dep, _)| dep.clone())
        .collect();

    Dependencies {
        dependency_graph: DependencyGraph {
            nodes: internal_dependencies.keys().cloned().collect(),
            edges,
        },
        internal_dependencies,
        external_dependencies: external.into_iter().collect(),
        critical_dependencies,
    }
}

// ============================================================================
// Complexity and recommendations
// ============================================================================

pub fn assess_complexity(
    problem: &ProblemAnalysis,
    file_count: usize,
    requirements: &Requirements,
) -> ComplexityAssessment {
    let mut factors = Vec::new();
    let mut score = match file_count {
        1 => {
            factors.push("single_file".to_string());
            10
        }
        n if n <= 3 => {
            factors.push("few_files".to_string());
            30
        }
        _ => {
            factors.push("many_files".to_string());
            60
        }
    };

    score += problem.problem_type.weight();

    if problem.technologies.len() > 2 {
        score += 20;
        factors.push("multiple_technologies".to_string());
    }
    if requirements.functional.len() > 5 {
        score += 20;
        factors.push("complex_requirements".to_string());
    }

    let level = if score <= 40 {
        ComplexityTier::Low
    } else if score <= 80 {
        ComplexityTier::Medium
    } else {
        ComplexityTier::High
    };

    let mut recommended_agents = vec![AgentType::Researcher];
    let mut recommend = |agent: AgentType| {
        if !recommended_agents.contains(&agent) {
            recommended_agents.push(agent);
        }
    };
    if factors.iter().any(|f| f == "many_files") {
        recommend(AgentType::Architect);
        recommend(AgentType::Coder);
    }
    if factors.iter().any(|f| f == "complex_requirements") {
        recommend(AgentType::Architect);
    }
    if factors.iter().any(|f| f == "multiple_technologies") {
        recommend(AgentType::Coder);
        recommend(AgentType::Tester);
    }
    recommend(AgentType::Reviewer);

    ComplexityAssessment {
        level,
        score,
        factors,
        estimated_time: 30 + score * 2,
        recommended_agents,
        confidence: (1.0 - score as f64 / 200.0).clamp(0.5, 1.0),
    }
}

pub fn recommendations(problem: &ProblemAnalysis, complexity: &ComplexityAssessment) -> Vec<String> {
    let mut out = Vec::new();
    if complexity.level == ComplexityTier::High {
        out.push("Break down into smaller subtasks".to_string());
        out.push("Implement incremental changes with testing".to_string());
        out.push("Consider pair programming or code review".to_string());
    }

    match problem.problem_type {
        ProblemType::BugFix => {
            out.push("Start with reproducing the issue".to_string());
            out.push("Add regression tests".to_string());
        }
        ProblemType::FeatureAddition => {
            out.push("Design API/interface first".to_string());
            out.push("Implement comprehensive test coverage".to_string());
        }
        ProblemType::Optimization => {
            out.push("Profile current performance".to_string());
            out.push("Establish performance benchmarks".to_string());
        }
        _ => {}
    }

    if problem.technologies.iter().any(|t| t == "database") {
        out.push("Consider database migration impacts".to_string());
    }
    if problem.technologies.iter().any(|t| t == "api") {
        out.push("Ensure backward compatibility".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantResponse, DisabledAssistant};
    use std::sync::Mutex;

    #[test]
    fn test_problem_type_precedence() {
        assert_eq!(ProblemType::classify("Fix crash in parser"), ProblemType::BugFix);
        assert_eq!(
            ProblemType::classify("Implement streaming upload"),
            ProblemType::FeatureAddition
        );
        assert_eq!(ProblemType::classify("Refactor the lexer"), ProblemType::Refactoring);
        assert_eq!(ProblemType::classify("Speed up: optimize hot loop"), ProblemType::Optimization);
        assert_eq!(ProblemType::classify("Rethink the architecture"), ProblemType::ArchitectureChange);
        assert_eq!(ProblemType::classify("Tidy docs"), ProblemType::Enhancement);
    }

    #[test]
    fn test_description_analysis() {
        let analysis = analyze_description(
            "Fix the REST api bug in users.py. The endpoint must return 404 for missing users.",
        );
        assert_eq!(analysis.problem_type, ProblemType::BugFix);
        assert_eq!(analysis.technologies, vec!["python", "api"]);
        assert!(analysis.keywords.contains(&"bug".to_string()));
        assert!(analysis.required_actions.contains(&"fix".to_string()));
        assert_eq!(analysis.main_goal, "Fix the REST api bug in users");
        assert_eq!(
            analysis.constraints_mentioned,
            vec!["The endpoint must return 404 for missing users"]
        );
    }

    fn requirements(functional: usize) -> Requirements {
        Requirements {
            functional: vec!["x".to_string(); functional],
            non_functional: vec![],
            testing: vec![],
            constraints: HashMap::new(),
            acceptance_criteria: vec![],
        }
    }

    #[test]
    fn test_complexity_single_file_bug_fix_is_low() {
        let problem = analyze_description("Fix the off-by-one bug");
        let assessment = assess_complexity(&problem, 1, &requirements(0));
        assert_eq!(assessment.score, 30);
        assert_eq!(assessment.level, ComplexityTier::Low);
        assert_eq!(assessment.estimated_time, 90);
        assert!((assessment.confidence - 0.85).abs() < 1e-9);
        assert_eq!(
            assessment.recommended_agents,
            vec![AgentType::Researcher, AgentType::Reviewer]
        );
    }

    #[test]
    fn test_complexity_high_and_confidence_floor() {
        let problem = analyze_description("Redesign the architecture for web, sql and python services");
        assert_eq!(problem.problem_type, ProblemType::ArchitectureChange);
        let assessment = assess_complexity(&problem, 6, &requirements(6));
        // 60 files + 80 type + 20 techs + 20 requirements
        assert_eq!(assessment.score, 180);
        assert_eq!(assessment.level, ComplexityTier::High);
        assert_eq!(assessment.confidence, 0.5);
        assert_eq!(
            assessment.factors,
            vec!["many_files", "multiple_technologies", "complex_requirements"]
        );

        let recs = recommendations(&problem, &assessment);
        assert_eq!(recs[0], "Break down into smaller subtasks");
        assert!(recs.contains(&"Consider database migration impacts".to_string()));
    }

    #[test]
    fn test_medium_boundary() {
        let problem = analyze_description("Add a flag");
        let assessment = assess_complexity(&problem, 3, &requirements(0));
        assert_eq!(assessment.score, 70);
        assert_eq!(assessment.level, ComplexityTier::Medium);
    }

    #[test]
    fn test_requirements_and_acceptance_criteria() {
        let mut problem = Problem::new(
            "p-1",
            "Parser should accept trailing commas.\n- handles [1,2,]\n- handles {\"a\":1,}\n2. keeps errors fast",
        )
        .with_test_cases(["test_trailing"]);
        problem
            .constraints
            .insert("max_runtime".to_string(), json!("5s"));

        let reqs = extract_requirements(&problem);
        assert_eq!(reqs.acceptance_criteria.len(), 3);
        assert_eq!(reqs.functional, vec!["Parser should accept trailing commas"]);
        assert!(reqs
            .non_functional
            .contains(&"Performance optimization required".to_string()));
        assert!(reqs.non_functional.contains(&"max_runtime: \"5s\"".to_string()));
        assert_eq!(reqs.testing[0], "Must pass 1 existing test cases");
    }

    #[test]
    fn test_repository_and_files() {
        let problem = Problem::new("p-1", "Fix bug in model validation")
            .with_repository("https://github.com/pallets/flask.git")
            .with_files([
                "src/app/models.py",
                "src/app/user_model.py",
                "tests/test_models.py",
                "README.md",
                "setup.py",
            ]);

        let repo = analyze_repository(&problem);
        assert_eq!(repo.main_language, "python");
        assert_eq!(repo.project_type, "library");
        assert_eq!(repo.test_structure.test_files, vec!["tests/test_models.py"]);
        assert_eq!(repo.test_structure.test_coverage_estimate, 20);
        assert_eq!(repo.documentation, vec!["README.md"]);
        assert_eq!(repo.configuration_files, vec!["setup.py"]);
        assert_eq!(repo.directory_structure.file_distribution["src/app"], 2);

        let files: Vec<FileAnalysis> = problem
            .files
            .iter()
            .map(|f| analyze_file(f, &problem.description))
            .collect();
        assert_eq!(files[0].category, FileCategory::Source);
        assert_eq!(files[2].category, FileCategory::Test);
        assert_eq!(files[2].issues, vec!["May need test case updates"]);
        assert_eq!(files[3].category, FileCategory::Documentation);

        let deps = analyze_dependencies(&problem, &files, &[]);
        assert_eq!(deps.critical_dependencies, vec!["database", "validation"]);
        assert!(deps.external_dependencies.contains(&"flask".to_string()));
        assert!(deps.external_dependencies.contains(&"requests".to_string()));
    }

    struct CannedAssistant {
        calls: Mutex<Vec<AssistantRequest>>,
    }

    #[async_trait]
    impl Assistant for CannedAssistant {
        async fn call(&self, request: AssistantRequest) -> AssistantResponse {
            let has_file = request.context.contains_key("file");
            self.calls.lock().unwrap().push(request);
            if has_file {
                AssistantResponse::ok(
                    json!({"issues": ["unbounded recursion"], "metrics": {"loc": 120}}),
                    0.1,
                )
            } else {
                AssistantResponse::failure("rate limited", 0.1)
            }
        }
    }

    #[tokio::test]
    async fn test_execute_merges_assistant_insights() {
        let assistant = Arc::new(CannedAssistant {
            calls: Mutex::new(Vec::new()),
        });
        let skill = ResearcherSkill::new(assistant.clone());
        let context = TaskContext::new(
            "t-1",
            Problem::new("p-1", "Fix recursion error").with_files(["core/walker.py"]),
            AgentType::Researcher,
        );

        let output = skill.execute(&context).await.unwrap();

        assert_eq!(assistant.calls.lock().unwrap().len(), 2);
        assert_eq!(output["problem_analysis"]["enhanced_analysis"], json!({}));
        assert_eq!(output["file_analysis"][0]["issues"][0], "unbounded recursion");
        assert_eq!(output["file_analysis"][0]["metrics"]["loc"], 120);
        assert_eq!(output["file_analysis"][0]["complexity"], "high");
        assert_eq!(output["complexity_assessment"]["level"], "low");
        assert_eq!(output["metadata"]["analyzer"], "researcher");
        for key in [
            "repository_analysis",
            "requirements",
            "dependencies",
            "recommendations",
        ] {
            assert!(output.get(key).is_some(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_disabled_assistant_is_skipped() {
        let skill = ResearcherSkill::new(Arc::new(DisabledAssistant));
        let report = skill.run(&Problem::new("p-1", "Add caching")).await;
        assert_eq!(report.problem_analysis.enhanced_analysis, json!({}));
        assert!(report.file_analysis.is_empty());
        // no files counts as a few: 30 + 40
        assert_eq!(report.complexity_assessment.score, 70);
    }
}
