//! Tools a workflow step can call, and the parser that finds calls in text.
//!
//! - [`core`] — [`Tool`], [`FnTool`], [`SchemaOnlyTool`], [`ToolCatalog`].
//! - [`parser`] — [`parse_tool_call`].

pub mod core;
pub mod parser;

pub use core::{FnTool, SchemaOnlyTool, Tool, ToolCatalog, ToolFuture};
pub use parser::{ParsedToolCall, parse_tool_call};
