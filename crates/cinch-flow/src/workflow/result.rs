//! The records a workflow run yields: one [`StepResult`] per step attempt,
//! plus at most one terminal record for a budget or initialization failure.

use serde::Serialize;
use serde_json::Value;

/// Why a step attempt (or the run) failed.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("max retries exceeded for step '{step_id}' ({attempts} attempts)")]
    MaxRetriesExceeded { step_id: String, attempts: u32 },
    #[error("no tool call detected in model output")]
    NoToolCall,
    #[error("tool not found: '{name}'")]
    ToolNotFound { name: String },
    #[error("{message}")]
    InvalidToolArguments { name: String, message: String },
    #[error("tool '{name}' failed: {message}")]
    ToolFailed { name: String, message: String },
    #[error("generation failed: {message}")]
    Generation { message: String },
    #[error("workflow timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout { elapsed_ms: u64, timeout_ms: u64 },
    #[error("max iterations exceeded ({max_iterations})")]
    MaxIterations { max_iterations: u32 },
    #[error("workflow initialization failed: {message}")]
    Initialization { message: String },
}

impl StepError {
    /// Step-local failures that roll back and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepError::NoToolCall
                | StepError::ToolNotFound { .. }
                | StepError::InvalidToolArguments { .. }
                | StepError::ToolFailed { .. }
                | StepError::Generation { .. }
        )
    }

    /// Failures that end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepError::Timeout { .. }
                | StepError::MaxIterations { .. }
                | StepError::Initialization { .. }
        )
    }
}

/// A tool invocation made by a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    /// `None` for announce-only tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Attempt bookkeeping attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    pub attempt: u32,
    pub max_attempts: u32,
    pub will_retry: bool,
    /// The run's iteration after this result was applied.
    pub iteration: u32,
    pub elapsed_ms: u64,
    pub memory_tokens: usize,
}

/// The outcome of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub metadata: StepMetadata,
}

impl StepResult {
    pub fn success(step_id: impl Into<String>, content: Option<String>) -> Self {
        Self {
            step_id: step_id.into(),
            content,
            tool_call: None,
            error: None,
            metadata: StepMetadata::default(),
        }
    }

    pub fn failure(step_id: impl Into<String>, error: StepError) -> Self {
        Self {
            step_id: step_id.into(),
            content: None,
            tool_call: None,
            error: Some(error),
            metadata: StepMetadata::default(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRecord) -> Self {
        self.tool_call = Some(call);
        self
    }

    pub fn with_metadata(mut self, metadata: StepMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this record ended the run.
    pub fn is_terminal(&self) -> bool {
        self.error.as_ref().is_some_and(StepError::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(StepError::NoToolCall.is_retryable());
        assert!(StepError::ToolNotFound { name: "x".into() }.is_retryable());
        assert!(!StepError::MaxIterations { max_iterations: 3 }.is_retryable());
        assert!(StepError::MaxIterations { max_iterations: 3 }.is_terminal());
        assert!(
            !StepError::MaxRetriesExceeded {
                step_id: "s".into(),
                attempts: 3
            }
            .is_terminal()
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(StepError::NoToolCall.to_string(), "no tool call detected in model output");
        assert_eq!(
            StepError::ToolNotFound { name: "calc".into() }.to_string(),
            "tool not found: 'calc'"
        );
    }

    #[test]
    fn serializes_camel_case_with_tagged_error() {
        let result = StepResult::failure("fetch", StepError::ToolNotFound { name: "calc".into() })
            .with_metadata(StepMetadata {
                attempt: 1,
                max_attempts: 3,
                will_retry: true,
                ..Default::default()
            });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stepId"], "fetch");
        assert_eq!(json["error"]["kind"], "tool_not_found");
        assert_eq!(json["error"]["name"], "calc");
        assert_eq!(json["metadata"]["willRetry"], true);
        assert_eq!(json["metadata"]["maxAttempts"], 3);
        assert!(json.get("content").is_none());
    }

    #[test]
    fn success_shape() {
        let result = StepResult::success("a", Some("done".into())).with_tool_call(ToolCallRecord {
            name: "t".into(),
            args: serde_json::json!({}),
            result: None,
        });
        assert!(result.is_success());
        assert!(!result.is_terminal());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["toolCall"]["name"], "t");
        assert!(json["toolCall"].get("result").is_none());
    }
}
