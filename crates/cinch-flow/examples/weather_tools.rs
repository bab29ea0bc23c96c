//! Tool-using workflow: a typed `FnTool` called from a `tool_use` step.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Restricting a step to a subset of tools with `toolChoice`
//! - Observing a run with `CompositeEventHandler`
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example weather_tools
//! ```

use cinch_flow::prelude::*;
use cinch_flow::schemars;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;

/// Arguments for the `get_weather` tool.
#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    /// City name, e.g. "NYC".
    city: String,
}

fn weather_tool() -> FnTool {
    FnTool::new(
        ToolDef::new(
            "get_weather",
            "Current weather for a city",
            json_schema_for::<WeatherArgs>(),
        ),
        |args: WeatherArgs| async move {
            Ok::<String, String>(format!("Sunny, 72F in {}", args.city))
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt::init();

    let key = std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY is not set")?;
    let session = OpenRouterSession::new(key)?;

    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("lookup", "Look up the weather for the city the user named.")
            .with_tool_choice(["get_weather"]),
        StepSpec::new("answer", "Answer the user in one sentence using the tool result."),
    ])
    .with_system_prompt("You are a concise weather assistant.");

    let tools = ToolCatalog::new().with(weather_tool());
    let events = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let WorkflowEvent::ToolInvoked { name, result, .. } = event {
                eprintln!("  [tool] {name} -> {}", result.unwrap_or("(announced)"));
            }
        }));
    let executor =
        WorkflowExecutor::new(&session, &tools, ExecutorConfig::default()).with_event_handler(&events);

    let mut results = std::pin::pin!(executor.execute("What's the weather in NYC?", &workflow));
    while let Some(result) = results.next().await {
        match (&result.content, &result.error) {
            (_, Some(error)) => println!("{}: error: {error}", result.step_id),
            (Some(content), None) => println!("{}: {content}", result.step_id),
            (None, None) => println!("{}: (no content)", result.step_id),
        }
    }
    Ok(())
}
