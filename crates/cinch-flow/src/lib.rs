//! Multi-step workflow engine for LLM agents with a token-budgeted memory.
//!
//! `cinch-flow` drives a caller-defined sequence of steps (prompts, optional
//! tool invocations, generation parameters) to completion against any
//! [`GenerationSession`](api::session::GenerationSession), while keeping the
//! conversational context inside a bounded token budget. The core abstraction
//! is the [`WorkflowExecutor`](workflow::executor::WorkflowExecutor): a pull
//! stream of [`StepResult`](workflow::result::StepResult) records that advances
//! one step per poll.
//!
//! # Getting started
//!
//! ```ignore
//! use cinch_flow::prelude::*;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let session = OpenRouterSession::new(std::env::var("OPENROUTER_KEY").unwrap())?
//!         .with_model("anthropic/claude-sonnet-4");
//!
//!     let workflow = WorkflowDefinition::new(vec![
//!         StepSpec::new("analyze", "Analyze the request.").with_task(GenerationTask::Reasoning),
//!         StepSpec::new("respond", "Write the final answer."),
//!     ])
//!     .with_system_prompt("You are a careful analyst.");
//!
//!     let tools = ToolCatalog::new();
//!     let executor = WorkflowExecutor::new(&session, &tools, ExecutorConfig::default())
//!         .with_event_handler(&LoggingHandler);
//!
//!     let mut results = std::pin::pin!(executor.execute("Why is the sky blue?", &workflow));
//!     while let Some(result) = results.next().await {
//!         println!("{}: {:?}", result.step_id, result.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a workflow:** [`WorkflowExecutor`](workflow::executor::WorkflowExecutor)
//!   with a [`WorkflowDefinition`](workflow::definition::WorkflowDefinition).
//!   Definitions can be built in code or loaded from JSON.
//! - **Execute a single step:** [`StepExecutor`](workflow::step::StepExecutor).
//! - **Register tools:** [`Tool`](tools::core::Tool), [`FnTool`](tools::core::FnTool)
//!   and [`ToolCatalog`](tools::core::ToolCatalog). Tools without an
//!   implementation are announce-only ([`SchemaOnlyTool`](tools::core::SchemaOnlyTool)).
//! - **Manage context:** [`MemoryStore`](context::store::MemoryStore) with a
//!   pluggable [`CompressionStrategy`](context::compression::CompressionStrategy).
//! - **Plug in a model:** implement
//!   [`GenerationSession`](api::session::GenerationSession), or use
//!   [`OpenRouterSession`](api::openrouter::OpenRouterSession) /
//!   [`ScriptedSession`](api::session::ScriptedSession).
//! - **Observe a run:** implement [`EventHandler`](workflow::events::EventHandler).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`workflow`] | Definitions, run state, step executor, workflow executor, events |
//! | [`context`] | Token estimation, memory store, checkpoints, compression strategies |
//! | [`tools`] | Tool trait, catalogue, tool-call parser |
//! | [`api`] | Generation session contract, streaming helpers, OpenRouter adapter |

pub mod api;
pub mod context;
pub mod prelude;
pub mod tools;
pub mod workflow;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used to declare tool parameter schemas from
/// strongly typed argument structs.
///
/// # Example
///
/// ```
/// use cinch_flow::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct WeatherArgs {
///     city: String,
///     #[serde(default)]
///     units: Option<String>,
/// }
///
/// let schema = json_schema_for::<WeatherArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"city".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message as sent to the model: role and text only. Memory metadata never
/// reaches the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the model (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// The tool's name.
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("done");
        assert_eq!(assist.role, MessageRole::Assistant);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(Message::assistant("x")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "x");
    }

    #[test]
    fn tool_def_uses_function_format() {
        let def = ToolDef::new(
            "get_weather",
            "Current weather for a city",
            serde_json::json!({"type": "object"}),
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "get_weather");
        assert_eq!(def.name(), "get_weather");
    }

    #[test]
    fn function_def_defaults_missing_fields() {
        let def: FunctionDef = serde_json::from_str(r#"{"name": "ping"}"#).unwrap();
        assert_eq!(def.description, "");
        assert_eq!(def.parameters["type"], "object");
    }
}
