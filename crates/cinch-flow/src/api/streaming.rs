//! Server-Sent Events decoding for OpenAI-compatible chat completion streams,
//! plus reasoning-markup stripping for generated text.
//!
//! [`SseDecoder`] is fed raw response bytes as they arrive and yields
//! [`TokenChunk`]s. Text deltas pass straight through; reasoning deltas are
//! dropped; native tool-call deltas are accumulated per index and flushed as
//! a single `<tool_call>{...}</tool_call>` text fragment when the choice
//! finishes, so the engine's text-based tool-call parser sees them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{trace, warn};

use super::session::TokenChunk;

// ── Reasoning markup ───────────────────────────────────────────────

static CLOSED_REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>|<thinking>.*?</thinking>")
        .expect("invalid reasoning pattern regex")
});

static UNTERMINATED_REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think(?:ing)?>.*\z")
        .expect("invalid reasoning pattern regex")
});

/// Remove `<think>` / `<thinking>` blocks from generated text and trim it.
///
/// An opening tag with no matching close swallows everything after it.
pub fn strip_reasoning(text: &str) -> String {
    let closed = CLOSED_REASONING.replace_all(text, "");
    let open = UNTERMINATED_REASONING.replace(&closed, "");
    open.trim().to_string()
}

// ── SSE wire types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
struct StreamToolCallDelta {
    index: Option<usize>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn render(&self) -> String {
        let arguments = serde_json::from_str::<serde_json::Value>(&self.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));
        let call = serde_json::json!({ "name": self.name, "arguments": arguments });
        format!("<tool_call>{call}</tool_call>")
    }
}

// ── Decoder ────────────────────────────────────────────────────────

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<usize, PendingToolCall>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` (or [`finish`](Self::finish)) has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes; returns the chunks completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<TokenChunk> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&String::from_utf8_lossy(&line), &mut out);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Flush whatever is left at end of body. Always ends with [`TokenChunk::Done`]
    /// unless the stream already terminated.
    pub fn finish(&mut self) -> Vec<TokenChunk> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.process_line(&String::from_utf8_lossy(&rest), &mut out);
        if !self.done {
            self.flush_tool_calls(&mut out);
            out.push(TokenChunk::Done);
            self.done = true;
        }
        out
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<TokenChunk>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            return;
        };
        if data == "[DONE]" {
            self.flush_tool_calls(out);
            out.push(TokenChunk::Done);
            self.done = true;
            return;
        }
        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => self.apply(chunk, out),
            Err(e) => warn!("Failed to parse SSE chunk: {e} (data: {data})"),
        }
    }

    fn apply(&mut self, chunk: StreamChunk, out: &mut Vec<TokenChunk>) {
        for choice in chunk.choices.unwrap_or_default() {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content
                    && !content.is_empty()
                {
                    out.push(TokenChunk::Text(content));
                }
                if let Some(reasoning) = delta.reasoning
                    && !reasoning.is_empty()
                {
                    trace!("dropping {} chars of reasoning", reasoning.len());
                }
                for tc in delta.tool_calls.unwrap_or_default() {
                    let pending = self.tool_calls.entry(tc.index.unwrap_or(0)).or_default();
                    if let Some(func) = tc.function {
                        if let Some(name) = func.name {
                            pending.name.push_str(&name);
                        }
                        if let Some(args) = func.arguments {
                            pending.arguments.push_str(&args);
                        }
                    }
                }
            }
            if choice.finish_reason.is_some() {
                trace!("Stream finish_reason: {:?}", choice.finish_reason);
                self.flush_tool_calls(out);
            }
        }
    }

    fn flush_tool_calls(&mut self, out: &mut Vec<TokenChunk>) {
        for (_, call) in std::mem::take(&mut self.tool_calls) {
            if call.name.is_empty() {
                continue;
            }
            out.push(TokenChunk::Text(call.render()));
        }
    }
}
