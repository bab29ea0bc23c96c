//! Workflow definitions and the machinery that runs them.
//!
//! A run moves through these pieces:
//!
//! 1. **[`definition`]**: the immutable [`WorkflowDefinition`] (ordered
//!    [`StepSpec`]s, declared tools, limits), built in code or loaded from JSON.
//! 2. **[`state`]**: [`RunState`], created per run. Owns the memory store, the
//!    merged tool catalogue and per-step attempt counters.
//! 3. **[`step`]**: [`StepExecutor`] runs one attempt of one step inside a
//!    memory checkpoint.
//! 4. **[`executor`]**: [`WorkflowExecutor`] picks the next eligible step,
//!    enforces the iteration and wall-clock limits and yields
//!    [`StepResult`]s as a pull stream.
//!
//! [`events`] carries run-scoped observation; [`config`] holds the memory
//! and executor knobs.

pub mod config;
pub mod definition;
pub mod events;
pub mod executor;
pub mod result;
pub mod state;
pub mod step;

pub use config::{ExecutorConfig, MemoryConfig};
pub use definition::{DefinitionError, GenerationTask, StepSpec, WorkflowDefinition};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    WorkflowEvent,
};
pub use executor::{RunPhase, WorkflowExecutor};
pub use result::{StepError, StepMetadata, StepResult, ToolCallRecord};
pub use state::{RunState, StepState, StepStatus, ToolResult};
pub use step::StepExecutor;
