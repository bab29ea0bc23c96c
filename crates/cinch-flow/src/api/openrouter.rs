//! [`GenerationSession`] over the OpenRouter chat completions API.
//!
//! Every request is sent with `stream: true` and the response body is read
//! incrementally with `chunk()`, so long generations never hit a single-body
//! timeout. There is no retry here: a transport failure surfaces as an error
//! item on the token stream, which the step executor treats as a failed
//! attempt.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream;
use serde_json::Value;
use tracing::{debug, trace};

use super::session::{GenerationRequest, GenerationSession, TokenChunk, TokenStream};
use super::streaming::SseDecoder;

/// OpenRouter chat completions endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Async session for the OpenRouter API.
pub struct OpenRouterSession {
    client: reqwest::Client,
    api_key: String,
    model: String,
    referer: String,
    title: String,
    url: String,
}

impl std::fmt::Debug for OpenRouterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterSession")
            .field("model", &self.model)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl OpenRouterSession {
    /// Create a session with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/cinch-rs", "cinch-flow")
    }

    /// Create a session with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("cinch-flow/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            referer: referer.into(),
            title: title.into(),
            url: OPENROUTER_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the session at another OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The JSON body sent for a request.
    pub fn request_body(&self, request: &GenerationRequest) -> Result<Value, String> {
        let mut body = serde_json::to_value(request)
            .map_err(|e| format!("failed to serialize request: {e}"))?;
        body["model"] = Value::String(self.model.clone());
        body["stream"] = Value::Bool(true);
        Ok(body)
    }

    async fn open(&self, body: Value) -> Result<reqwest::Response, String> {
        debug!(
            "LLM request: model={}, messages={}, tools={}",
            self.model,
            body["messages"].as_array().map_or(0, Vec::len),
            body["tools"].as_array().map_or(0, Vec::len),
        );
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("streaming request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }
        Ok(resp)
    }
}

/// Where a response stream is in its lifecycle.
enum SseState {
    Pending(Result<Value, String>),
    Reading {
        resp: reqwest::Response,
        decoder: SseDecoder,
        queue: VecDeque<TokenChunk>,
    },
    Draining(VecDeque<TokenChunk>),
    Finished,
}

impl GenerationSession for OpenRouterSession {
    fn generate(&self, request: GenerationRequest) -> TokenStream<'_> {
        let initial = SseState::Pending(self.request_body(&request));
        Box::pin(stream::unfold(initial, move |state| async move {
            let mut state = state;
            loop {
                state = match state {
                    SseState::Pending(Err(e)) => return Some((Err(e), SseState::Finished)),
                    SseState::Pending(Ok(body)) => match self.open(body).await {
                        Ok(resp) => SseState::Reading {
                            resp,
                            decoder: SseDecoder::new(),
                            queue: VecDeque::new(),
                        },
                        Err(e) => return Some((Err(e), SseState::Finished)),
                    },
                    SseState::Reading {
                        mut resp,
                        mut decoder,
                        mut queue,
                    } => {
                        if let Some(chunk) = queue.pop_front() {
                            return Some((
                                Ok(chunk),
                                SseState::Reading {
                                    resp,
                                    decoder,
                                    queue,
                                },
                            ));
                        }
                        if decoder.is_done() {
                            SseState::Finished
                        } else {
                            match resp.chunk().await {
                                Ok(Some(bytes)) => {
                                    trace!("SSE chunk: {} bytes", bytes.len());
                                    queue.extend(decoder.push(&bytes));
                                    SseState::Reading {
                                        resp,
                                        decoder,
                                        queue,
                                    }
                                }
                                Ok(None) => SseState::Draining(decoder.finish().into()),
                                Err(e) => {
                                    return Some((
                                        Err(format!("failed to read streaming chunk: {e}")),
                                        SseState::Finished,
                                    ));
                                }
                            }
                        }
                    }
                    SseState::Draining(mut queue) => match queue.pop_front() {
                        Some(chunk) => return Some((Ok(chunk), SseState::Draining(queue))),
                        None => SseState::Finished,
                    },
                    SseState::Finished => return None,
                };
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ToolDef};

    #[test]
    fn body_carries_model_and_stream_flag() {
        let session = OpenRouterSession::new("sk-test")
            .unwrap()
            .with_model("openai/gpt-4o-mini");
        let request = GenerationRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            tools: None,
            temperature: 0.3,
            max_tokens: 64,
        };
        let body = session.request_body(&request).unwrap();
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn body_includes_tools_when_present() {
        let session = OpenRouterSession::new("sk-test").unwrap();
        let request = GenerationRequest {
            tools: Some(vec![ToolDef::new(
                "get_weather",
                "Weather lookup",
                serde_json::json!({"type": "object"}),
            )]),
            ..Default::default()
        };
        let body = session.request_body(&request).unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn debug_hides_api_key() {
        let session = OpenRouterSession::new("sk-secret").unwrap();
        let debug = format!("{session:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains(DEFAULT_MODEL));
    }
}
