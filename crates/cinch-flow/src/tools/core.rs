//! Tool abstraction for workflow steps.
//!
//! The [`Tool`] trait pairs a static API definition (name, description, JSON
//! schema) with an optional async implementation. Tools are collected into a
//! [`ToolCatalog`] keyed by name. A tool without an implementation is
//! announce-only: the model may see and call it, but nothing runs locally.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace};

use crate::{FunctionDef, ToolDef};

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// A tool a step may invoke.
///
/// # Example
///
/// ```ignore
/// struct Clock;
///
/// impl Tool for Clock {
///     fn definition(&self) -> ToolDef {
///         ToolDef::new("now", "Current UTC time", serde_json::json!({"type": "object"}))
///     }
///
///     fn execute(&self, _arguments: serde_json::Value) -> ToolFuture<'_> {
///         Box::pin(async move { Ok(chrono::Utc::now().to_rfc3339()) })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model.
    fn definition(&self) -> ToolDef;

    /// Run the tool with parsed arguments.
    ///
    /// An `Err` fails the step attempt that invoked it.
    fn execute(&self, arguments: Value) -> ToolFuture<'_>;

    /// Whether [`execute`](Tool::execute) does real work. Announce-only
    /// tools return `false`.
    fn has_implementation(&self) -> bool {
        true
    }

    /// The tool's name (delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── SchemaOnlyTool ─────────────────────────────────────────────────

/// An announce-only tool: the model sees its schema, but there is no local
/// handler. Tools declared in a workflow definition file start out as this.
#[derive(Debug, Clone)]
pub struct SchemaOnlyTool {
    def: ToolDef,
}

impl SchemaOnlyTool {
    pub fn new(def: ToolDef) -> Self {
        Self { def }
    }

    pub fn from_function(function: FunctionDef) -> Self {
        Self::new(ToolDef::new(
            function.name,
            function.description,
            function.parameters,
        ))
    }
}

impl Tool for SchemaOnlyTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, _arguments: Value) -> ToolFuture<'_> {
        let msg = format!("tool '{}' has no implementation", self.def.name());
        Box::pin(async move { Err(msg) })
    }

    fn has_implementation(&self) -> bool {
        false
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> + Send + Sync,
>;

/// A closure-based tool that deserializes its arguments into `A` and
/// delegates to a handler.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct WeatherArgs { city: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("get_weather", "Current weather", json_schema_for::<WeatherArgs>()),
///     |args: WeatherArgs| async move { Ok(format!("Sunny in {}", args.city)) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = def.name().to_string();
        let erased = move |raw: Value| -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> {
            match serde_json::from_value::<A>(raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => {
                    let msg = format!("invalid arguments for tool '{name}': {e}");
                    Box::pin(async move { Err(msg) })
                }
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: Value) -> ToolFuture<'_> {
        (self.handler)(arguments)
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── ToolCatalog ────────────────────────────────────────────────────

/// Tools available to a run, keyed by name and listed in name order.
///
/// Cheap to clone: tools are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        debug!("Registered tool: {name}");
        self.tools.insert(name, Arc::new(tool));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register an announce-only tool.
    pub fn with_schema_only(self, def: ToolDef) -> Self {
        self.with(SchemaOnlyTool::new(def))
    }

    /// Catalogue of announce-only tools built from definition-file entries.
    pub fn from_definitions(functions: &[FunctionDef]) -> Self {
        functions.iter().cloned().fold(Self::new(), |catalog, f| {
            catalog.with(SchemaOnlyTool::from_function(f))
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Definitions for the model, in name order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Union of two catalogues. On a name clash the entry from `self` wins.
    pub fn merged(&self, other: &ToolCatalog) -> ToolCatalog {
        let mut tools = other.tools.clone();
        for (name, tool) in &self.tools {
            tools.insert(name.clone(), Arc::clone(tool));
        }
        ToolCatalog { tools }
    }

    /// The named subset. Names not in the catalogue are skipped; an empty
    /// list selects everything.
    pub fn subset(&self, names: &[String]) -> ToolCatalog {
        if names.is_empty() {
            return self.clone();
        }
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        ToolCatalog { tools }
    }

    /// Check arguments against the named tool's parameter schema.
    ///
    /// An unknown tool or an invalid schema passes; only a real schema
    /// violation is an error.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), String> {
        let Some(tool) = self.get(name) else {
            return Ok(());
        };
        let schema = tool.definition().function.parameters;
        let validator = match jsonschema::validator_for(&schema) {
            Ok(v) => v,
            Err(e) => {
                debug!("skipping validation for '{name}': invalid schema: {e}");
                return Ok(());
            }
        };

        let errors: Vec<String> = validator
            .iter_errors(arguments)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "argument validation failed for tool '{name}': {}",
                errors.join("; ")
            ))
        }
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &Value) {
    let rendered = arguments.to_string();
    let args_preview: String = rendered.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if rendered.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {rendered}");
}
