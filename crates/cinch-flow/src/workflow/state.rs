//! Mutable per-run state: step bookkeeping, the merged tool catalogue, and
//! the run's memory store.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use super::config::ExecutorConfig;
use super::definition::{DefinitionError, StepSpec, WorkflowDefinition};
use super::events::EventHandler;
use crate::MessageRole;
use crate::api::session::GenerationSession;
use crate::context::store::{MemoryStore, MessageDraft, MessageType};
use crate::tools::core::ToolCatalog;

/// Where a step stands.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Succeeded,
    /// Attempts exhausted. Never selected again.
    Failed,
}

/// Per-step bookkeeping. `attempts` only grows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepState {
    pub attempts: u32,
    pub status: StepStatus,
    /// Last successful textual result.
    pub result: Option<String>,
}

impl StepState {
    pub fn is_complete(&self) -> bool {
        self.status != StepStatus::Pending
    }
}

/// A tool output recorded against the step that produced it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub description: String,
    pub result: String,
}

/// State for one workflow execution.
#[derive(Debug)]
pub struct RunState {
    /// Starts at 1; advances only on successful attempts.
    pub iteration: u32,
    pub max_iterations: u32,
    pub started_at: Instant,
    pub timeout: Duration,
    pub completed: HashSet<String>,
    pub step_states: HashMap<String, StepState>,
    /// Caller tools merged over the definition's declared tools.
    pub tools: ToolCatalog,
    pub memory: MemoryStore,
    pub tool_results: HashMap<String, Vec<ToolResult>>,
}

impl RunState {
    /// Validate the definition, merge tool catalogues and seed memory with
    /// the system prompt (if any) and the user prompt.
    pub async fn initialize(
        definition: &WorkflowDefinition,
        prompt: &str,
        caller_tools: &ToolCatalog,
        config: &ExecutorConfig,
        session: &dyn GenerationSession,
        events: &dyn EventHandler,
    ) -> Result<Self, DefinitionError> {
        definition.validate()?;
        config.memory.validate()?;

        let tools = caller_tools.merged(&ToolCatalog::from_definitions(&definition.tools));
        definition.validate_tool_choices(&tools)?;

        let mut seed = Vec::new();
        if let Some(system) = &definition.system_prompt {
            seed.push(MessageDraft::text(
                MessageRole::System,
                system.clone(),
                MessageType::SystemInstruction,
            ));
        }
        seed.push(MessageDraft::text(
            MessageRole::User,
            prompt,
            MessageType::UserPrompt,
        ));
        let mut memory = MemoryStore::new(config.memory.clone());
        memory.add(seed, session, events).await;

        let step_states = definition
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepState::default()))
            .collect();

        debug!(
            "run state initialized: {} steps, {} tools, ~{} memory tokens",
            definition.steps.len(),
            tools.len(),
            memory.estimated_tokens()
        );

        Ok(Self {
            iteration: 1,
            max_iterations: definition.max_iterations,
            started_at: Instant::now(),
            timeout: definition.timeout_duration(),
            completed: HashSet::new(),
            step_states,
            tools,
            memory,
            tool_results: HashMap::new(),
        })
    }

    /// First step, in definition order, not yet complete.
    pub fn next_step<'w>(&self, definition: &'w WorkflowDefinition) -> Option<&'w StepSpec> {
        definition
            .steps
            .iter()
            .find(|s| !self.completed.contains(&s.id))
    }

    pub fn step_state(&self, step_id: &str) -> Option<&StepState> {
        self.step_states.get(step_id)
    }

    /// State for a step, created on first use.
    pub fn step_state_mut(&mut self, step_id: &str) -> &mut StepState {
        self.step_states.entry(step_id.to_string()).or_default()
    }

    pub fn mark_succeeded(&mut self, step_id: &str, result: Option<String>) {
        let state = self.step_state_mut(step_id);
        state.status = StepStatus::Succeeded;
        state.result = result;
        self.completed.insert(step_id.to_string());
    }

    /// Retire a step whose attempts are exhausted.
    pub fn mark_failed(&mut self, step_id: &str) {
        self.step_state_mut(step_id).status = StepStatus::Failed;
        self.completed.insert(step_id.to_string());
    }

    pub fn record_tool_result(&mut self, step_id: &str, result: ToolResult) {
        self.tool_results
            .entry(step_id.to_string())
            .or_default()
            .push(result);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDef;
    use crate::api::session::ScriptedSession;
    use crate::workflow::events::NoopHandler;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new(vec![StepSpec::new("a", "first"), StepSpec::new("b", "second")])
            .with_system_prompt("be terse")
    }

    async fn init(def: &WorkflowDefinition, tools: &ToolCatalog) -> Result<RunState, DefinitionError> {
        RunState::initialize(
            def,
            "the task",
            tools,
            &ExecutorConfig::default(),
            &ScriptedSession::default(),
            &NoopHandler,
        )
        .await
    }

    #[tokio::test]
    async fn seeds_memory_with_system_and_user() {
        let state = init(&definition(), &ToolCatalog::new()).await.unwrap();
        let messages = state.memory.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "the task");
        assert_eq!(state.iteration, 1);
        assert_eq!(state.step_states.len(), 2);
    }

    #[tokio::test]
    async fn next_step_skips_completed() {
        let def = definition();
        let mut state = init(&def, &ToolCatalog::new()).await.unwrap();
        assert_eq!(state.next_step(&def).unwrap().id, "a");
        state.mark_succeeded("a", Some("ok".into()));
        assert_eq!(state.next_step(&def).unwrap().id, "b");
        state.mark_failed("b");
        assert!(state.next_step(&def).is_none());
        assert_eq!(state.step_state("b").unwrap().status, StepStatus::Failed);
        assert!(state.step_state("a").unwrap().is_complete());
    }

    #[tokio::test]
    async fn merges_declared_tools_under_caller_tools() {
        let def = definition().with_tool(crate::FunctionDef {
            name: "declared".into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let caller = ToolCatalog::new()
            .with_schema_only(ToolDef::new("caller", "", serde_json::json!({"type": "object"})));
        let state = init(&def, &caller).await.unwrap();
        assert_eq!(state.tools.names(), vec!["caller", "declared"]);
    }

    #[tokio::test]
    async fn unknown_tool_choice_fails_initialization() {
        let def = WorkflowDefinition::new(vec![StepSpec::new("a", "p").with_tool_choice(["ghost"])]);
        let err = init(&def, &ToolCatalog::new()).await.unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn zero_timeout_expires() {
        let def = definition().with_timeout(Duration::ZERO);
        let state = init(&def, &ToolCatalog::new()).await.unwrap();
        std::thread::sleep(Duration::from_millis(1));
        assert!(state.timed_out());
    }

    #[tokio::test]
    async fn tool_results_recorded_per_step() {
        let mut state = init(&definition(), &ToolCatalog::new()).await.unwrap();
        state.record_tool_result(
            "a",
            ToolResult {
                name: "t".into(),
                description: "d".into(),
                result: "r".into(),
            },
        );
        assert_eq!(state.tool_results["a"].len(), 1);
    }
}
