//! Executes one attempt of one workflow step.
//!
//! Every attempt is bracketed by a memory checkpoint taken under the step id.
//! A failed attempt rolls memory back to that checkpoint, so a retry sees
//! exactly the log the first attempt saw. The step is retired once its
//! attempts are exhausted.

use std::sync::Arc;

use tracing::{debug, warn};

use super::definition::{GenerationTask, StepSpec};
use super::events::{EventHandler, NoopHandler, WorkflowEvent};
use super::result::{StepError, StepMetadata, StepResult, ToolCallRecord};
use super::state::{RunState, ToolResult};
use crate::MessageRole;
use crate::api::session::{GenerationRequest, GenerationSession, collect_stream};
use crate::api::streaming::strip_reasoning;
use crate::context::store::{MessageContent, MessageDraft, MessageType};
use crate::tools::core::{Tool, ToolCatalog, log_tool_call};
use crate::tools::parser::parse_tool_call;

/// Runs single step attempts against a generation session.
pub struct StepExecutor<'a> {
    session: &'a dyn GenerationSession,
    events: &'a dyn EventHandler,
    validate_tool_args: bool,
}

impl<'a> StepExecutor<'a> {
    pub fn new(session: &'a dyn GenerationSession) -> Self {
        Self {
            session,
            events: &NoopHandler,
            validate_tool_args: true,
        }
    }

    pub fn with_event_handler(mut self, events: &'a dyn EventHandler) -> Self {
        self.events = events;
        self
    }

    pub fn with_tool_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_tool_args = enabled;
        self
    }

    /// Run one attempt of `step`. Never fails: problems come back as an
    /// error-tagged [`StepResult`].
    pub async fn execute(&self, step: &StepSpec, state: &mut RunState) -> StepResult {
        let attempts = state.step_state_mut(&step.id).attempts;
        if attempts >= step.max_attempts {
            state.mark_failed(&step.id);
            let error = StepError::MaxRetriesExceeded {
                step_id: step.id.clone(),
                attempts,
            };
            self.events.on_event(&WorkflowEvent::StepFailed {
                step_id: &step.id,
                attempt: attempts,
                error: &error,
                will_retry: false,
            });
            return StepResult::failure(&step.id, error)
                .with_metadata(metadata(state, step, attempts, false));
        }

        state.memory.create_checkpoint(&step.id);
        let attempt = attempts + 1;
        state.step_state_mut(&step.id).attempts = attempt;
        self.events.on_event(&WorkflowEvent::StepStarted {
            step_id: &step.id,
            attempt,
            max_attempts: step.max_attempts,
            iteration: state.iteration,
        });

        match self.attempt(step, state).await {
            Ok(result) => {
                let complete = state.step_state(&step.id).is_some_and(|s| s.is_complete());
                self.events.on_event(&WorkflowEvent::StepSucceeded {
                    step_id: &step.id,
                    attempt,
                    complete,
                });
                result.with_metadata(metadata(state, step, attempt, false))
            }
            Err(error) => self.fail(step, state, attempt, error),
        }
    }

    /// Steps 4 to 9 of an attempt. Any `Err` is rolled back by the caller.
    async fn attempt(&self, step: &StepSpec, state: &mut RunState) -> Result<StepResult, StepError> {
        let task = step.task();
        let tools = match task {
            GenerationTask::ToolUse => Some(state.tools.subset(step.selected_tools())),
            GenerationTask::Chat | GenerationTask::Reasoning => None,
        };

        state.memory.add_uncompressed(vec![
            MessageDraft::text(
                MessageRole::User,
                step_instruction(step, tools.as_ref()),
                MessageType::StepPrompt,
            )
            .for_step(&step.id),
        ]);

        let request = GenerationRequest {
            messages: state.memory.messages(),
            tools: tools
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(ToolCatalog::definitions),
            temperature: step.temperature,
            max_tokens: step.max_tokens,
        };
        debug!(
            "step {}: generating ({:?}, {} messages, temp={}, max_tokens={})",
            step.id,
            task,
            request.messages.len(),
            request.temperature,
            request.max_tokens
        );

        let raw = collect_stream(self.session.generate(request))
            .await
            .map_err(|message| StepError::Generation { message })?;
        let clean = strip_reasoning(&raw);

        match tools {
            Some(tools) => self.complete_tool_use(step, state, &tools, clean).await,
            None => {
                state
                    .memory
                    .add(
                        vec![
                            MessageDraft::text(MessageRole::Assistant, clean.clone(), MessageType::StepResult)
                                .for_step(&step.id),
                        ],
                        self.session,
                        self.events,
                    )
                    .await;
                state.mark_succeeded(&step.id, Some(clean.clone()));
                Ok(StepResult::success(&step.id, Some(clean)))
            }
        }
    }

    async fn complete_tool_use(
        &self,
        step: &StepSpec,
        state: &mut RunState,
        tools: &ToolCatalog,
        clean: String,
    ) -> Result<StepResult, StepError> {
        let call = parse_tool_call(&clean).ok_or(StepError::NoToolCall)?;
        let tool: Arc<dyn Tool> = tools
            .get(&call.name)
            .cloned()
            .ok_or_else(|| StepError::ToolNotFound {
                name: call.name.clone(),
            })?;

        if self.validate_tool_args {
            tools
                .validate_arguments(&call.name, &call.args)
                .map_err(|message| StepError::InvalidToolArguments {
                    name: call.name.clone(),
                    message,
                })?;
        }

        let assistant = MessageDraft::text(MessageRole::Assistant, clean.clone(), MessageType::ToolUse)
            .for_step(&step.id);

        if !tool.has_implementation() {
            // Announce-only: the step stays open for the caller to resolve.
            state
                .memory
                .add(vec![assistant], self.session, self.events)
                .await;
            self.events.on_event(&WorkflowEvent::ToolInvoked {
                step_id: &step.id,
                name: &call.name,
                arguments: &call.args,
                result: None,
            });
            return Ok(StepResult::success(&step.id, Some(clean)).with_tool_call(ToolCallRecord {
                name: call.name,
                args: call.args,
                result: None,
            }));
        }

        log_tool_call(&call.name, &call.args);
        let output = tool
            .execute(call.args.clone())
            .await
            .map_err(|message| StepError::ToolFailed {
                name: call.name.clone(),
                message,
            })?;

        state
            .memory
            .add(
                vec![
                    assistant,
                    MessageDraft::new(
                        MessageRole::User,
                        MessageContent::ToolResult {
                            name: call.name.clone(),
                            result: output.clone(),
                        },
                        MessageType::ToolResult,
                    )
                    .for_step(&step.id),
                ],
                self.session,
                self.events,
            )
            .await;
        state.record_tool_result(
            &step.id,
            ToolResult {
                name: call.name.clone(),
                description: tool.definition().function.description,
                result: output.clone(),
            },
        );
        self.events.on_event(&WorkflowEvent::ToolInvoked {
            step_id: &step.id,
            name: &call.name,
            arguments: &call.args,
            result: Some(&output),
        });
        state.mark_succeeded(&step.id, Some(output.clone()));

        Ok(StepResult::success(&step.id, Some(clean)).with_tool_call(ToolCallRecord {
            name: call.name,
            args: call.args,
            result: Some(output),
        }))
    }

    fn fail(&self, step: &StepSpec, state: &mut RunState, attempt: u32, error: StepError) -> StepResult {
        if state.memory.rollback_to_checkpoint(&step.id) {
            self.events.on_event(&WorkflowEvent::CheckpointRestored { step_id: &step.id });
        }
        let will_retry = attempt < step.max_attempts;
        if !will_retry {
            state.mark_failed(&step.id);
        }
        warn!(
            "step {}: attempt {attempt}/{} failed: {error}",
            step.id, step.max_attempts
        );
        self.events.on_event(&WorkflowEvent::StepFailed {
            step_id: &step.id,
            attempt,
            error: &error,
            will_retry,
        });
        StepResult::failure(&step.id, error).with_metadata(metadata(state, step, attempt, will_retry))
    }
}

fn metadata(state: &RunState, step: &StepSpec, attempt: u32, will_retry: bool) -> StepMetadata {
    StepMetadata {
        attempt,
        max_attempts: step.max_attempts,
        will_retry,
        iteration: state.iteration,
        elapsed_ms: u64::try_from(state.elapsed().as_millis()).unwrap_or(u64::MAX),
        memory_tokens: state.memory.estimated_tokens(),
    }
}

/// The instruction message appended before generation.
pub fn step_instruction(step: &StepSpec, tools: Option<&ToolCatalog>) -> String {
    let mut text = format!("[step {}] {}", step.id, step.prompt);
    if let Some(tools) = tools {
        let names = tools.names();
        if !names.is_empty() {
            text.push_str(&format!("\n\nAvailable tools: {}", names.join(", ")));
        }
        text.push_str(
            "\nTo call a tool, reply with <tool_call>{\"name\": \"<tool name>\", \"arguments\": {...}}</tool_call>",
        );
    }
    text
}
