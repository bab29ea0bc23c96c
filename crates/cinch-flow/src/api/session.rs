//! The generation session contract and a scripted implementation for tests.
//!
//! A session turns a [`GenerationRequest`] into a stream of [`TokenChunk`]s.
//! How it reaches a model (HTTP, local runtime) is its own business; the
//! engine only accumulates text until the terminal marker.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Message, ToolDef};

/// One element of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenChunk {
    /// An incremental text fragment.
    Text(String),
    /// End of generation. Anything after it is ignored.
    Done,
}

/// Boxed stream of token chunks returned by [`GenerationSession::generate`].
pub type TokenStream<'a> = Pin<Box<dyn Stream<Item = Result<TokenChunk, String>> + Send + 'a>>;

/// Everything a session needs to produce one reply.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            tools: None,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// A model the engine can talk to.
pub trait GenerationSession: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> TokenStream<'_>;
}

/// Drain a token stream into one string, stopping at [`TokenChunk::Done`].
///
/// A stream that ends without a terminal marker is treated as complete.
pub async fn collect_stream(mut stream: TokenStream<'_>) -> Result<String, String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            TokenChunk::Text(fragment) => text.push_str(&fragment),
            TokenChunk::Done => break,
        }
    }
    Ok(text)
}

// ── Scripted session ───────────────────────────────────────────────

/// A canned reply for [`ScriptedSession`].
///
/// Deserializes from either a bare string or `{"error": "..."}`, so scripts
/// can be loaded from JSON files.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScriptedReply {
    Text(String),
    Error { error: String },
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptedReply::Error {
            error: message.into(),
        }
    }
}

/// Fragment size used when streaming scripted text.
const SCRIPTED_CHUNK_CHARS: usize = 8;

/// Deterministic session that replays a queue of replies in order and
/// records every request it receives. Once the script runs out, each call
/// fails.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedSession {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script made of plain text replies.
    pub fn from_texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(ScriptedReply::text))
    }

    /// Append a reply to the end of the script.
    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn chunk_text(text: &str) -> Vec<Result<TokenChunk, String>> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(SCRIPTED_CHUNK_CHARS)
        .map(|c| Ok(TokenChunk::Text(c.iter().collect())))
        .chain(std::iter::once(Ok(TokenChunk::Done)))
        .collect()
}

impl GenerationSession for ScriptedSession {
    fn generate(&self, request: GenerationRequest) -> TokenStream<'_> {
        trace!(
            "scripted generate: {} messages, tools={}",
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len)
        );
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let items = match next {
            Some(ScriptedReply::Text(text)) => chunk_text(&text),
            Some(ScriptedReply::Error { error }) => vec![Err(error)],
            None => vec![Err("scripted session exhausted".to_string())],
        };
        Box::pin(futures::stream::iter(items))
    }
}
