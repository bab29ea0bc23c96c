//! Convenience re-exports for common `cinch-flow` types.
//!
//! Meant to be glob-imported when running workflows:
//!
//! ```ignore
//! use cinch_flow::prelude::*;
//! ```
//!
//! Covers what most programs need: wire types, the session contract and its
//! two stock implementations, tools, workflow definitions, the executor and
//! event handlers. Compression strategies, the SSE decoder and run state
//! internals stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{FunctionDef, Message, MessageRole, ToolDef, json_schema_for};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::api::{
    GenerationRequest, GenerationSession, OpenRouterSession, ScriptedReply, ScriptedSession,
    TokenChunk,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{CompressionConfig, MemoryStore, MessageType};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, SchemaOnlyTool, Tool, ToolCatalog, ToolFuture};

// ── Workflows ───────────────────────────────────────────────────────
pub use crate::workflow::{
    CompositeEventHandler, DefinitionError, EventHandler, ExecutorConfig, FnEventHandler,
    GenerationTask, LoggingHandler, MemoryConfig, NoopHandler, RunPhase, StepError, StepExecutor,
    StepResult, StepSpec, WorkflowDefinition, WorkflowEvent, WorkflowExecutor,
};
