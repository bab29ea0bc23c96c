//! Run-scoped observation for workflow runs.
//!
//! The executor, step executor and memory store report what they do through
//! [`WorkflowEvent`] values delivered to an injected [`EventHandler`]. The
//! handler is passed by reference into each run and never stored globally,
//! so two concurrent runs never share log context.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs (the default) |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Metrics, progress displays, audit trails |

use serde_json::Value;
use tracing::{debug, info, warn};

use super::executor::RunPhase;
use super::result::StepError;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a workflow run.
#[derive(Debug)]
pub enum WorkflowEvent<'a> {
    /// State initialized; the loop is about to start.
    RunStarted {
        steps: usize,
        tools: usize,
        max_iterations: u32,
        timeout_ms: u64,
    },
    /// A step attempt is starting.
    StepStarted {
        step_id: &'a str,
        attempt: u32,
        max_attempts: u32,
        iteration: u32,
    },
    /// A step attempt produced a result without error.
    StepSucceeded {
        step_id: &'a str,
        attempt: u32,
        /// Whether the step is now complete. Announce-only tool calls leave it open.
        complete: bool,
    },
    /// A step attempt failed.
    StepFailed {
        step_id: &'a str,
        attempt: u32,
        error: &'a StepError,
        will_retry: bool,
    },
    /// A tool was called. `result` is `None` for announce-only tools.
    ToolInvoked {
        step_id: &'a str,
        name: &'a str,
        arguments: &'a Value,
        result: Option<&'a str>,
    },
    /// Memory was rolled back to the checkpoint taken before a failed attempt.
    CheckpointRestored { step_id: &'a str },
    /// The memory store replaced its log with a compressed one.
    Compressed {
        strategy: &'static str,
        tokens_before: usize,
        tokens_after: usize,
        messages_before: usize,
        messages_after: usize,
    },
    /// Compression failed; the log was left untouched.
    CompressionFailed {
        strategy: &'static str,
        error: &'a str,
    },
    /// The run reached a terminal phase.
    RunFinished {
        phase: &'a RunPhase,
        iteration: u32,
        results: usize,
    },
}

/// Handler for workflow events.
///
/// # Example
///
/// ```ignore
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: &WorkflowEvent<'_>) {
///         if let WorkflowEvent::StepSucceeded { step_id, .. } = event {
///             eprintln!("done: {step_id}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let WorkflowEvent::ToolInvoked { name, .. } = event {
///         println!("tool: {name}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_metrics_handler);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        match event {
            WorkflowEvent::RunStarted {
                steps,
                tools,
                max_iterations,
                timeout_ms,
            } => info!(
                "run started: steps={steps}, tools={tools}, max_iterations={max_iterations}, timeout={timeout_ms}ms"
            ),
            WorkflowEvent::StepStarted {
                step_id,
                attempt,
                max_attempts,
                iteration,
            } => info!("step {step_id}: attempt {attempt}/{max_attempts} (iteration {iteration})"),
            WorkflowEvent::StepSucceeded {
                step_id,
                attempt,
                complete,
            } => info!("step {step_id}: succeeded on attempt {attempt} (complete={complete})"),
            WorkflowEvent::StepFailed {
                step_id,
                attempt,
                error,
                will_retry,
            } => warn!("step {step_id}: attempt {attempt} failed: {error} (will_retry={will_retry})"),
            WorkflowEvent::ToolInvoked {
                step_id,
                name,
                result,
                ..
            } => match result {
                Some(r) => info!("step {step_id}: tool {name} returned {} chars", r.len()),
                None => info!("step {step_id}: tool {name} announced (no implementation)"),
            },
            WorkflowEvent::CheckpointRestored { step_id } => {
                debug!("step {step_id}: memory rolled back to checkpoint")
            }
            WorkflowEvent::Compressed {
                strategy,
                tokens_before,
                tokens_after,
                messages_before,
                messages_after,
            } => info!(
                "memory compressed ({strategy}): {messages_before} -> {messages_after} messages, ~{tokens_before} -> ~{tokens_after} tokens"
            ),
            WorkflowEvent::CompressionFailed { strategy, error } => {
                warn!("memory compression failed ({strategy}): {error}")
            }
            WorkflowEvent::RunFinished {
                phase,
                iteration,
                results,
            } => info!("run finished: phase={phase:?}, iteration={iteration}, results={results}"),
        }
    }
}
