//! The workflow executor: a pull stream of [`StepResult`]s.
//!
//! Nothing runs until the caller polls. Each poll advances the run by at
//! most one step attempt and yields its result. The run is an explicit state
//! machine ([`RunPhase`]):
//!
//! ```text
//!   Running ──step ok──────────▶ Running
//!   Running ──step error───────▶ StepFailed ──next poll──▶ Running
//!   Running ──no eligible step─▶ Completed      (no record)
//!   Running ──iteration budget─▶ MaxIterations  (one error record)
//!   Running ──wall clock───────▶ TimedOut       (one error record)
//!   init failure ──────────────▶ Errored        (one error record)
//! ```
//!
//! The iteration counter starts at 1 and advances only when an attempt
//! succeeds. Dropping the stream halts the run; an in-flight model call is
//! simply abandoned with it.

use futures::Stream;
use futures::stream;
use tracing::{debug, info};

use super::config::ExecutorConfig;
use super::definition::WorkflowDefinition;
use super::events::{EventHandler, NoopHandler, WorkflowEvent};
use super::result::{StepError, StepMetadata, StepResult};
use super::state::RunState;
use super::step::StepExecutor;
use crate::api::session::GenerationSession;
use crate::tools::core::ToolCatalog;

/// Where a run is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Running,
    /// The last attempt failed; the step may be retried on the next poll.
    StepFailed { step_id: String, attempt: u32 },
    Completed,
    TimedOut,
    MaxIterations,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::TimedOut | RunPhase::MaxIterations | RunPhase::Errored
        )
    }
}

/// Stream state between polls.
enum Cursor {
    Init {
        prompt: String,
    },
    Active {
        state: Box<RunState>,
        phase: RunPhase,
        results: usize,
    },
    Done,
}

/// Drives workflow definitions against a generation session.
///
/// Borrows its collaborators; one executor can run many workflows, each
/// with fresh state.
pub struct WorkflowExecutor<'a> {
    session: &'a dyn GenerationSession,
    tools: &'a ToolCatalog,
    config: ExecutorConfig,
    events: &'a dyn EventHandler,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(
        session: &'a dyn GenerationSession,
        tools: &'a ToolCatalog,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            session,
            tools,
            config,
            events: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, events: &'a dyn EventHandler) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `workflow` on `prompt`. Each call starts a fresh run.
    pub fn execute<'s>(
        &'s self,
        prompt: impl Into<String>,
        workflow: &'s WorkflowDefinition,
    ) -> impl Stream<Item = StepResult> + Send + 's {
        let cursor = Cursor::Init {
            prompt: prompt.into(),
        };
        stream::unfold(cursor, move |cursor| async move {
            self.advance(cursor, workflow).await
        })
    }

    async fn advance(
        &self,
        cursor: Cursor,
        workflow: &WorkflowDefinition,
    ) -> Option<(StepResult, Cursor)> {
        match cursor {
            Cursor::Done => None,
            Cursor::Init { prompt } => {
                match RunState::initialize(
                    workflow,
                    &prompt,
                    self.tools,
                    &self.config,
                    self.session,
                    self.events,
                )
                .await
                {
                    Ok(state) => {
                        self.events.on_event(&WorkflowEvent::RunStarted {
                            steps: workflow.steps.len(),
                            tools: state.tools.len(),
                            max_iterations: state.max_iterations,
                            timeout_ms: workflow.timeout,
                        });
                        self.poll_step(Box::new(state), RunPhase::Running, workflow, 0)
                            .await
                    }
                    Err(e) => {
                        let step_id = workflow
                            .steps
                            .first()
                            .map(|s| s.id.clone())
                            .unwrap_or_default();
                        let result = StepResult::failure(
                            step_id,
                            StepError::Initialization {
                                message: e.to_string(),
                            },
                        );
                        self.finish(&RunPhase::Errored, 0, 1);
                        Some((result, Cursor::Done))
                    }
                }
            }
            Cursor::Active {
                state,
                phase,
                results,
            } => self.poll_step(state, phase, workflow, results).await,
        }
    }

    async fn poll_step(
        &self,
        mut state: Box<RunState>,
        phase: RunPhase,
        workflow: &WorkflowDefinition,
        results: usize,
    ) -> Option<(StepResult, Cursor)> {
        debug!("advancing run from {phase:?} (iteration {})", state.iteration);

        let Some(step) = state.next_step(workflow) else {
            self.finish(&RunPhase::Completed, state.iteration, results);
            return None;
        };

        if state.iteration >= state.max_iterations {
            let result = terminal(
                &state,
                &step.id,
                StepError::MaxIterations {
                    max_iterations: state.max_iterations,
                },
            );
            self.finish(&RunPhase::MaxIterations, state.iteration, results + 1);
            return Some((result, Cursor::Done));
        }

        if state.timed_out() {
            let result = terminal(
                &state,
                &step.id,
                StepError::Timeout {
                    elapsed_ms: millis(state.elapsed()),
                    timeout_ms: workflow.timeout,
                },
            );
            self.finish(&RunPhase::TimedOut, state.iteration, results + 1);
            return Some((result, Cursor::Done));
        }

        let mut result = StepExecutor::new(self.session)
            .with_event_handler(self.events)
            .with_tool_arg_validation(self.config.validate_tool_args)
            .execute(step, &mut state)
            .await;

        let phase = if result.is_success() {
            state.iteration += 1;
            RunPhase::Running
        } else {
            RunPhase::StepFailed {
                step_id: step.id.clone(),
                attempt: result.metadata.attempt,
            }
        };
        result.metadata.iteration = state.iteration;

        Some((
            result,
            Cursor::Active {
                state,
                phase,
                results: results + 1,
            },
        ))
    }

    fn finish(&self, phase: &RunPhase, iteration: u32, results: usize) {
        info!("workflow finished: {phase:?} after {results} result(s)");
        self.events.on_event(&WorkflowEvent::RunFinished {
            phase,
            iteration,
            results,
        });
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn terminal(state: &RunState, step_id: &str, error: StepError) -> StepResult {
    let attempts = state.step_state(step_id).map_or(0, |s| s.attempts);
    StepResult::failure(step_id, error).with_metadata(StepMetadata {
        attempt: attempts,
        max_attempts: 0,
        will_retry: false,
        iteration: state.iteration,
        elapsed_ms: millis(state.elapsed()),
        memory_tokens: state.memory.estimated_tokens(),
    })
}
