//! End-to-end workflow runs against a scripted session.

use std::sync::{Arc, Mutex};

use cinch_flow::prelude::*;
use cinch_flow::workflow::ToolCallRecord;
use futures::StreamExt;
use serde_json::{Value, json};

async fn run_with(
    session: &ScriptedSession,
    tools: &ToolCatalog,
    config: ExecutorConfig,
    workflow: &WorkflowDefinition,
    events: &dyn EventHandler,
) -> Vec<StepResult> {
    WorkflowExecutor::new(session, tools, config)
        .with_event_handler(events)
        .execute("the task", workflow)
        .collect()
        .await
}

async fn run(session: &ScriptedSession, workflow: &WorkflowDefinition) -> Vec<StepResult> {
    run_with(
        session,
        &ToolCatalog::new(),
        ExecutorConfig::default(),
        workflow,
        &NoopHandler,
    )
    .await
}

fn weather_tool() -> FnTool {
    FnTool::new(
        ToolDef::new(
            "get_weather",
            "Current weather for a city",
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        ),
        |args: Value| async move {
            Ok::<String, String>(format!("Sunny in {}", args["city"].as_str().unwrap_or("?")))
        },
    )
}

#[tokio::test]
async fn reasoning_then_chat_feeds_first_output_forward() {
    let session = ScriptedSession::from_texts(["analysis done", "final answer"]);
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("analyze", "analyze").with_task(GenerationTask::Reasoning),
        StepSpec::new("respond", "respond").with_task(GenerationTask::Chat),
    ]);

    let results = run(&session, &workflow).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].step_id, "analyze");
    assert_eq!(results[0].content.as_deref(), Some("analysis done"));
    assert_eq!(results[1].step_id, "respond");
    assert_eq!(results[1].content.as_deref(), Some("final answer"));
    assert!(results.iter().all(StepResult::is_success));

    let requests = session.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests[1]
            .messages
            .iter()
            .any(|m| m.role == MessageRole::Assistant && m.content == "analysis done")
    );
    assert!(requests.iter().all(|r| r.tools.is_none()));
}

#[tokio::test]
async fn max_iterations_of_one_runs_nothing() {
    let session = ScriptedSession::from_texts(["never used"]);
    let workflow =
        WorkflowDefinition::new(vec![StepSpec::new("first", "p"), StepSpec::new("second", "p")])
            .with_max_iterations(1);

    let results = run(&session, &workflow).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].step_id, "first");
    assert_eq!(
        results[0].error,
        Some(StepError::MaxIterations { max_iterations: 1 })
    );
    assert_eq!(session.request_count(), 0);
}

#[tokio::test]
async fn tool_use_step_calls_registered_tool() {
    let session = ScriptedSession::from_texts([
        r#"<tool_call>{"name":"get_weather","arguments":{"city":"NYC"}}</tool_call>"#,
        "It is sunny in NYC.",
    ]);
    let tools = ToolCatalog::new().with(weather_tool());
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("lookup", "find the weather").with_tool_choice(["get_weather"]),
        StepSpec::new("answer", "answer the user"),
    ]);

    let results = run_with(
        &session,
        &tools,
        ExecutorConfig::default(),
        &workflow,
        &NoopHandler,
    )
    .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert_eq!(
        results[0].tool_call,
        Some(ToolCallRecord {
            name: "get_weather".into(),
            args: json!({"city": "NYC"}),
            result: Some("Sunny in NYC".into()),
        })
    );

    let requests = session.requests();
    let offered = requests[0].tools.as_ref().expect("tools offered");
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0].name(), "get_weather");

    // The tool output sits right after the assistant's call in the next request.
    let follow_up = &requests[1].messages;
    let call_at = follow_up
        .iter()
        .position(|m| m.role == MessageRole::Assistant && m.content.contains("get_weather"))
        .expect("assistant tool call kept");
    assert_eq!(follow_up[call_at + 1].content, "Sunny in NYC");
}

#[tokio::test]
async fn failed_attempt_leaves_memory_as_it_was() {
    let session = ScriptedSession::new([
        ScriptedReply::text("I would rather not call anything."),
        ScriptedReply::error("upstream 503"),
        ScriptedReply::text(r#"<tool_call>{"name":"get_weather","arguments":{"city":"Oslo"}}</tool_call>"#),
    ]);
    let tools = ToolCatalog::new().with(weather_tool());
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("lookup", "find the weather").with_tool_choice(["get_weather"]),
    ]);

    let results = run_with(
        &session,
        &tools,
        ExecutorConfig::default(),
        &workflow,
        &NoopHandler,
    )
    .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].error, Some(StepError::NoToolCall));
    assert!(matches!(results[1].error, Some(StepError::Generation { .. })));
    assert!(results[2].is_success());

    // Every retry sees exactly the log the first attempt saw.
    let requests = session.requests();
    assert_eq!(requests[0].messages, requests[1].messages);
    assert_eq!(requests[1].messages, requests[2].messages);
}

#[tokio::test]
async fn step_is_retired_after_max_attempts() {
    let session = ScriptedSession::from_texts(["no", "still no", "summary"]);
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("stubborn", "call a tool")
            .with_task(GenerationTask::ToolUse)
            .with_max_attempts(2),
        StepSpec::new("wrap_up", "summarize"),
    ]);

    let results = run(&session, &workflow).await;

    let ids: Vec<_> = results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ids, vec!["stubborn", "stubborn", "wrap_up"]);
    let attempts: Vec<_> = results[..2]
        .iter()
        .map(|r| (r.metadata.attempt, r.metadata.will_retry))
        .collect();
    assert_eq!(attempts, vec![(1, true), (2, false)]);
    assert!(results[2].is_success());
    assert_eq!(session.request_count(), 3);
}

#[tokio::test]
async fn iteration_only_advances_on_success() {
    let session = ScriptedSession::new([
        ScriptedReply::error("timeout"),
        ScriptedReply::error("timeout"),
        ScriptedReply::text("done"),
    ]);
    let workflow = WorkflowDefinition::new(vec![StepSpec::new("only", "p").with_max_attempts(3)]);

    let results = run(&session, &workflow).await;

    assert_eq!(results.len(), 3);
    let iterations: Vec<_> = results.iter().map(|r| r.metadata.iteration).collect();
    assert_eq!(iterations, vec![1, 1, 2]);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
}

#[tokio::test]
async fn announce_only_tool_leaves_step_open() {
    let session = ScriptedSession::from_texts([
        r#"<tool_call>{"name":"notify","arguments":{"msg":"hi"}}</tool_call>"#,
        r#"<tool_call>{"name":"notify","arguments":{"msg":"again"}}</tool_call>"#,
    ]);
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("announce", "tell the caller").with_tool_choice(["notify"]),
    ])
    .with_tool(FunctionDef {
        name: "notify".into(),
        description: "Handled by the caller".into(),
        parameters: json!({"type": "object"}),
    })
    .with_max_iterations(3);

    let results = run(&session, &workflow).await;

    // Each announce succeeds without completing the step, so the iteration
    // budget ends the run.
    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert_eq!(results[0].tool_call.as_ref().map(|c| c.result.clone()), Some(None));
    assert!(results[1].is_success());
    assert_eq!(
        results[2].error,
        Some(StepError::MaxIterations { max_iterations: 3 })
    );
}

#[tokio::test]
async fn memory_compresses_and_keeps_anchors() {
    let long = "lorem ipsum dolor sit amet ".repeat(12);
    let session = ScriptedSession::from_texts([long.clone(), long.clone(), long]);
    let workflow = WorkflowDefinition::new(vec![
        StepSpec::new("a", "first"),
        StepSpec::new("b", "second"),
        StepSpec::new("c", "third"),
    ])
    .with_system_prompt("be brief");
    let config =
        ExecutorConfig::default().with_memory(MemoryConfig::default().with_max_tokens(150));

    let compressions = Arc::new(Mutex::new(0));
    let counter = compressions.clone();
    let events = FnEventHandler::new(move |event| {
        if matches!(event, WorkflowEvent::Compressed { .. }) {
            *counter.lock().unwrap() += 1;
        }
    });

    let results = run_with(&session, &ToolCatalog::new(), config, &workflow, &events).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(StepResult::is_success));
    assert!(*compressions.lock().unwrap() >= 1);

    let last = session.requests().pop().expect("three requests");
    assert_eq!(last.messages[0].role, MessageRole::System);
    assert_eq!(last.messages[0].content, "be brief");
    assert!(last.messages.iter().any(|m| m.content == "the task"));
    assert!(last.messages.last().is_some_and(|m| m.content.contains("third")));
}

#[tokio::test]
async fn results_serialize_with_camel_case_metadata() {
    let session = ScriptedSession::from_texts(["ok"]);
    let workflow = WorkflowDefinition::new(vec![StepSpec::new("a", "p")]);
    let results = run(&session, &workflow).await;

    let value = serde_json::to_value(&results[0]).unwrap();
    assert_eq!(value["stepId"], "a");
    assert_eq!(value["metadata"]["maxAttempts"], 3);
    assert_eq!(value["metadata"]["willRetry"], false);
    assert!(value.get("error").is_none());
}

#[tokio::test]
async fn definition_from_json_runs() {
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "systemPrompt": "be brief",
            "maxIterations": 5,
            "timeout": 30000,
            "steps": [
                {"id": "draft", "prompt": "draft it", "generationTask": "reasoning"},
                {"id": "polish", "prompt": "polish it", "temperature": 0.2, "maxTokens": 256}
            ]
        }"#,
    )
    .unwrap();
    let session = ScriptedSession::from_texts(["draft", "polished"]);

    let results = run(&session, &workflow).await;

    assert_eq!(results.len(), 2);
    let requests = session.requests();
    assert_eq!(requests[1].temperature, 0.2);
    assert_eq!(requests[1].max_tokens, 256);
}
