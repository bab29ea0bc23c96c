//! Summarization compression: collapse the whole log into one summary message.
//!
//! The summary is produced by a single low-temperature, token-capped call on
//! the generation session passed in at compression time. Reasoning markup is
//! stripped from the reply. The strategy ignores `preserve` and the token
//! target; the result is always exactly one `summary` message.

use tracing::{debug, warn};

use super::compression::{CompressFuture, CompressionError, CompressionStrategy};
use super::store::{MemoryMessage, MessageDraft, MessageType};
use crate::api::session::{GenerationRequest, GenerationSession, collect_stream};
use crate::api::streaming::strip_reasoning;
use crate::{Message, MessageRole};

/// The default instruction given to the model when summarizing.
pub const SUMMARIZATION_PROMPT: &str = "\
Summarize the following conversation concisely. Focus on:
- The original request and what was asked
- Key findings, decisions and intermediate results
- Tool calls made and what they returned
- What remains to be done

Rules:
- Only include facts explicitly stated in the messages. Do not infer or extrapolate.
- Preserve names, numbers and error messages verbatim.
- Be terse. Reply with the summary only.";

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 512;

/// The `summarization` strategy.
#[derive(Debug, Clone)]
pub struct Summarizer {
    system_prompt: String,
    temperature: f32,
    max_summary_tokens: u32,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self {
            system_prompt: SUMMARIZATION_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_summary_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
        }
    }
}

impl Summarizer {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_summary_tokens(mut self, max: u32) -> Self {
        self.max_summary_tokens = max;
        self
    }

    /// Build the one-shot summarization request for a log.
    pub fn build_request(&self, messages: &[MemoryMessage]) -> GenerationRequest {
        GenerationRequest {
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(transcript(messages)),
            ],
            tools: None,
            temperature: self.temperature,
            max_tokens: self.max_summary_tokens,
        }
    }
}

/// Serialize a log as `role: content` lines.
pub fn transcript(messages: &[MemoryMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl CompressionStrategy for Summarizer {
    fn name(&self) -> &'static str {
        "summarization"
    }

    fn honors_preserved_types(&self) -> bool {
        false
    }

    fn compress<'a>(
        &'a self,
        messages: &'a [MemoryMessage],
        _target_tokens: usize,
        _preserve: &'a [MessageType],
        session: &'a dyn GenerationSession,
    ) -> CompressFuture<'a> {
        Box::pin(async move {
            let request = self.build_request(messages);
            let raw = collect_stream(session.generate(request))
                .await
                .map_err(|e| {
                    warn!("summarization call failed: {e}");
                    CompressionError::Generation(e)
                })?;

            let summary = strip_reasoning(&raw);
            if summary.is_empty() {
                return Err(CompressionError::EmptySummary);
            }
            debug!(
                "summarized {} messages into {} chars",
                messages.len(),
                summary.len()
            );

            Ok(vec![
                MessageDraft::text(MessageRole::Assistant, summary, MessageType::Summary).stamp(),
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::session::{ScriptedReply, ScriptedSession};

    fn log() -> Vec<MemoryMessage> {
        vec![
            MessageDraft::text(MessageRole::System, "Be helpful.", MessageType::SystemInstruction)
                .stamp(),
            MessageDraft::text(MessageRole::User, "Plan a trip", MessageType::UserPrompt).stamp(),
            MessageDraft::text(MessageRole::Assistant, "Go to Lisbon", MessageType::StepResult)
                .for_step("plan")
                .stamp(),
        ]
    }

    #[test]
    fn transcript_uses_role_prefixed_lines() {
        assert_eq!(
            transcript(&log()),
            "system: Be helpful.\nuser: Plan a trip\nassistant: Go to Lisbon"
        );
    }

    #[test]
    fn request_is_low_temperature_and_capped() {
        let request = Summarizer::default().build_request(&log());
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 512);
        assert!(request.tools.is_none());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, SUMMARIZATION_PROMPT);
        assert!(request.messages[1].content.contains("Go to Lisbon"));
    }

    #[test]
    fn builders_override_defaults() {
        let request = Summarizer::default()
            .with_system_prompt("Short.")
            .with_temperature(0.0)
            .with_max_summary_tokens(64)
            .build_request(&[]);
        assert_eq!(request.messages[0].content, "Short.");
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 64);
    }

    #[tokio::test]
    async fn collapses_to_single_summary_message() {
        let session = ScriptedSession::from_texts(["<think>hmm</think>User wants Lisbon trip."]);
        let out = Summarizer::default()
            .compress(&log(), 10, &[MessageType::UserPrompt], &session)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, MessageRole::Assistant);
        assert_eq!(out[0].message_type(), MessageType::Summary);
        assert_eq!(out[0].content.render(), "User wants Lisbon trip.");
        assert_eq!(session.request_count(), 1);
    }

    #[tokio::test]
    async fn generation_failure_is_reported() {
        let session = ScriptedSession::new([ScriptedReply::error("backend down")]);
        let err = Summarizer::default()
            .compress(&log(), 10, &[], &session)
            .await
            .unwrap_err();
        assert!(matches!(err, CompressionError::Generation(ref e) if e.contains("backend down")));
    }

    #[tokio::test]
    async fn reasoning_only_reply_is_empty_summary() {
        let session = ScriptedSession::from_texts(["<thinking>just thoughts</thinking>"]);
        let err = Summarizer::default()
            .compress(&log(), 10, &[], &session)
            .await
            .unwrap_err();
        assert_eq!(err, CompressionError::EmptySummary);
    }
}
