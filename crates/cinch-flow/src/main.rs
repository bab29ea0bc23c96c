//! Run a workflow definition and print each step result as a JSON line.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable unless
//! `--script` replays canned responses instead.
//!
//! # Examples
//!
//! ```sh
//! # Run against OpenRouter
//! cinch-flow --workflow review.json --prompt "Review this changelog"
//!
//! # Pipe the prompt from stdin, summarize memory when it fills up
//! cat notes.md | cinch-flow --workflow digest.json --stdin \
//!   --max-context-tokens 4000 --strategy summarization
//!
//! # Offline run with scripted model replies
//! cinch-flow --workflow review.json --prompt "hi" --script replies.json -v
//! ```

use std::io::{self, Read};
use std::process;

use cinch_flow::api::{GenerationSession, OpenRouterSession, ScriptedReply, ScriptedSession};
use cinch_flow::context::CompressionConfig;
use cinch_flow::tools::ToolCatalog;
use cinch_flow::workflow::{
    ExecutorConfig, LoggingHandler, MemoryConfig, StepResult, WorkflowDefinition,
    WorkflowExecutor,
};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run a multi-step workflow and stream its step results as JSON lines.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "cinch-flow")]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Path to the workflow definition (JSON)
    #[arg(long)]
    workflow: String,

    /// Initial user prompt
    #[arg(long)]
    prompt: Option<String>,

    /// Read the prompt from stdin
    #[arg(long)]
    stdin: bool,

    // ── Model ──────────────────────────────────────────────────
    /// Model to use for every step
    #[arg(long, default_value = cinch_flow::api::openrouter::DEFAULT_MODEL)]
    model: String,

    /// Replay responses from a JSON array instead of calling a model
    #[arg(long)]
    script: Option<String>,

    // ── Memory ─────────────────────────────────────────────────
    /// Token budget for the run's memory
    #[arg(long)]
    max_context_tokens: Option<usize>,

    /// Fraction of the budget that triggers compression (0.0 – 1.0]
    #[arg(long)]
    compression_threshold: Option<f64>,

    /// Compression strategy
    #[arg(long, value_enum, default_value_t = Strategy::SlidingWindow)]
    strategy: Strategy,

    // ── Logging ────────────────────────────────────────────────
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    SlidingWindow,
    Summarization,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

fn read_prompt(cli: &Cli) -> Result<String, String> {
    let piped = if cli.stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        Some(buf)
    } else {
        None
    };

    match (&cli.prompt, piped) {
        (Some(prompt), Some(piped)) => Ok(format!("{prompt}\n\n{piped}")),
        (Some(prompt), None) => Ok(prompt.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err("provide --prompt, --stdin, or both".to_string()),
    }
}

fn load_script(path: &str) -> Result<ScriptedSession, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read script file '{path}': {e}"))?;
    let replies: Vec<ScriptedReply> = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse script file '{path}': {e}"))?;
    Ok(ScriptedSession::new(replies))
}

fn build_session(cli: &Cli) -> Result<Box<dyn GenerationSession>, String> {
    if let Some(path) = &cli.script {
        return Ok(Box::new(load_script(path)?));
    }
    let key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY is not set (or pass --script)".to_string())?;
    let session =
        OpenRouterSession::with_headers(key, "https://crates.io/crates/cinch-flow", "cinch-flow")?
            .with_model(&cli.model);
    Ok(Box::new(session))
}

fn build_config(cli: &Cli) -> ExecutorConfig {
    let mut memory = MemoryConfig::default();
    if let Some(max) = cli.max_context_tokens {
        memory = memory.with_max_tokens(max);
    }
    if let Some(threshold) = cli.compression_threshold {
        memory = memory.with_compression_threshold(threshold);
    }
    memory = memory.with_compression(match cli.strategy {
        Strategy::SlidingWindow => CompressionConfig::SlidingWindow,
        Strategy::Summarization => CompressionConfig::summarization(),
    });
    ExecutorConfig::default().with_memory(memory)
}

/// Run the workflow. Returns whether a terminal error ended it.
async fn run(cli: &Cli) -> Result<bool, String> {
    let workflow = WorkflowDefinition::from_json_file(&cli.workflow).map_err(|e| e.to_string())?;
    let prompt = read_prompt(cli)?;
    let session = build_session(cli)?;
    let tools = ToolCatalog::new();
    let executor = WorkflowExecutor::new(session.as_ref(), &tools, build_config(cli))
        .with_event_handler(&LoggingHandler);

    let mut results = std::pin::pin!(executor.execute(prompt, &workflow));
    let mut terminal = false;
    while let Some(result) = results.next().await {
        terminal |= result.is_terminal();
        println!("{}", to_json_line(&result)?);
    }
    Ok(terminal)
}

fn to_json_line(result: &StepResult) -> Result<String, String> {
    serde_json::to_string(result).map_err(|e| format!("failed to encode step result: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(false) => {}
        Ok(true) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
