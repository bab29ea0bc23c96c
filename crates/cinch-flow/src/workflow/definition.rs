//! Workflow definitions: the ordered steps, declared tools and run limits.
//!
//! Definitions are immutable once built. They can be assembled in code or
//! loaded from camelCase JSON:
//!
//! ```json
//! {
//!   "systemPrompt": "You are a travel assistant.",
//!   "maxIterations": 5,
//!   "timeout": 30000,
//!   "tools": [{"name": "get_weather", "parameters": {"type": "object"}}],
//!   "steps": [
//!     {"id": "weather", "prompt": "Check the weather.", "toolChoice": ["get_weather"]},
//!     {"id": "answer", "prompt": "Answer the user.", "temperature": 0.3}
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::FunctionDef;
use crate::tools::core::ToolCatalog;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_STEP_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_STEP_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Problems with a workflow definition or its configuration.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read workflow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workflow JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
    #[error("workflow has no steps")]
    EmptyWorkflow,
    #[error("step '{step_id}' selects unknown tool '{tool}'")]
    UnknownTool { step_id: String, tool: String },
    #[error("compression threshold {0} is outside (0, 1]")]
    InvalidThreshold(f64),
}

/// The kind of generation a step performs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    Chat,
    Reasoning,
    ToolUse,
}

fn default_temperature() -> f32 {
    DEFAULT_STEP_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_STEP_MAX_TOKENS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// One unit of work in a workflow.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Unique within a workflow.
    pub id: String,
    pub prompt: String,
    /// Explicit task. When absent, a `tool_choice` implies `tool_use`,
    /// otherwise `chat`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_task: Option<GenerationTask>,
    /// Tools the step may call. Empty or absent means every registered tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Vec<String>>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            generation_task: None,
            tool_choice: None,
            temperature: DEFAULT_STEP_TEMPERATURE,
            max_tokens: DEFAULT_STEP_MAX_TOKENS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_task(mut self, task: GenerationTask) -> Self {
        self.generation_task = Some(task);
        self
    }

    /// Restrict the step to the named tools. Implies `tool_use` unless a
    /// task was set explicitly.
    pub fn with_tool_choice<S: Into<String>>(mut self, tools: impl IntoIterator<Item = S>) -> Self {
        self.tool_choice = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The effective generation task.
    pub fn task(&self) -> GenerationTask {
        match (self.generation_task, &self.tool_choice) {
            (Some(task), _) => task,
            (None, Some(_)) => GenerationTask::ToolUse,
            (None, None) => GenerationTask::Chat,
        }
    }

    /// The tool names this step selects; empty means all.
    pub fn selected_tools(&self) -> &[String] {
        self.tool_choice.as_deref().unwrap_or(&[])
    }
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// An immutable workflow description.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub steps: Vec<StepSpec>,
    /// Declared tools. Announce-only unless the caller registers an
    /// implementation under the same name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<FunctionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Wall-clock budget in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl WorkflowDefinition {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self {
            steps,
            tools: Vec::new(),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tool(mut self, tool: FunctionDef) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Structural checks: at least one step, unique step ids.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::EmptyWorkflow);
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }

    /// Every `toolChoice` name must resolve in `tools`.
    pub fn validate_tool_choices(&self, tools: &ToolCatalog) -> Result<(), DefinitionError> {
        for step in &self.steps {
            if let Some(name) = step.selected_tools().iter().find(|n| !tools.contains(n)) {
                return Err(DefinitionError::UnknownTool {
                    step_id: step.id.clone(),
                    tool: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDef;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "systemPrompt": "You are a travel assistant.",
        "maxIterations": 5,
        "tools": [{"name": "get_weather", "parameters": {"type": "object"}}],
        "steps": [
            {"id": "weather", "prompt": "Check the weather.", "toolChoice": ["get_weather"]},
            {"id": "answer", "prompt": "Answer.", "generationTask": "reasoning", "temperature": 0.3}
        ]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let def = WorkflowDefinition::from_json_str(SAMPLE).unwrap();
        assert_eq!(def.max_iterations, 5);
        assert_eq!(def.timeout, DEFAULT_TIMEOUT_MS);
        assert_eq!(def.system_prompt.as_deref(), Some("You are a travel assistant."));
        assert_eq!(def.tools[0].name, "get_weather");

        let weather = &def.steps[0];
        assert_eq!(weather.task(), GenerationTask::ToolUse);
        assert_eq!(weather.max_attempts, 3);
        assert_eq!(weather.max_tokens, 1024);
        assert_eq!(weather.temperature, 0.7);

        let answer = def.step("answer").unwrap();
        assert_eq!(answer.task(), GenerationTask::Reasoning);
        assert_eq!(answer.temperature, 0.3);
    }

    #[test]
    fn task_defaults_to_chat() {
        assert_eq!(StepSpec::new("a", "p").task(), GenerationTask::Chat);
        let explicit = StepSpec::new("a", "p")
            .with_tool_choice(["x"])
            .with_task(GenerationTask::Chat);
        assert_eq!(explicit.task(), GenerationTask::Chat);
    }

    #[test]
    fn rejects_empty_and_duplicate() {
        assert!(matches!(
            WorkflowDefinition::from_json_str(r#"{"steps": []}"#),
            Err(DefinitionError::EmptyWorkflow)
        ));
        let dup = r#"{"steps": [{"id": "a", "prompt": "1"}, {"id": "a", "prompt": "2"}]}"#;
        assert!(matches!(
            WorkflowDefinition::from_json_str(dup),
            Err(DefinitionError::DuplicateStepId(id)) if id == "a"
        ));
        assert!(matches!(
            WorkflowDefinition::from_json_str("{"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn tool_choice_must_resolve() {
        let def = WorkflowDefinition::new(vec![StepSpec::new("s", "p").with_tool_choice(["nope"])]);
        let tools = ToolCatalog::new()
            .with_schema_only(ToolDef::new("yes", "", serde_json::json!({"type": "object"})));
        assert!(matches!(
            def.validate_tool_choices(&tools),
            Err(DefinitionError::UnknownTool { step_id, tool }) if step_id == "s" && tool == "nope"
        ));
        let ok = WorkflowDefinition::new(vec![StepSpec::new("s", "p").with_tool_choice(["yes"])]);
        assert!(ok.validate_tool_choices(&tools).is_ok());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let def = WorkflowDefinition::from_json_file(file.path()).unwrap();
        assert_eq!(def.steps.len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkflowDefinition::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn timeout_round_trips_through_duration() {
        let def = WorkflowDefinition::new(vec![StepSpec::new("a", "p")])
            .with_timeout(Duration::from_secs(2));
        assert_eq!(def.timeout, 2000);
        assert_eq!(def.timeout_duration(), Duration::from_secs(2));
    }
}
