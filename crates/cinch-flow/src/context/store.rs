//! The memory store: the ordered message log a workflow run builds up,
//! with per-message metadata, checkpoint/rollback, and budget-triggered
//! compression.
//!
//! The store is the only component that mutates the log. Every insertion
//! stamps the message with a timestamp and a frozen token estimate; after
//! each non-suppressed insertion the store compares the log's estimated size
//! against `max_tokens * compression_threshold` and, when exceeded, replaces
//! the whole log with the output of the configured
//! [`CompressionStrategy`](super::compression::CompressionStrategy).
//! Compression failures are logged and swallowed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::compression::CompressionStrategy;
use super::tokens;
use crate::api::session::GenerationSession;
use crate::workflow::config::MemoryConfig;
use crate::workflow::events::{EventHandler, WorkflowEvent};
use crate::{Message, MessageRole};

// ── Message model ──────────────────────────────────────────────────

/// What a stored message represents in the workflow.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    SystemInstruction,
    UserPrompt,
    StepPrompt,
    StepResult,
    ToolUse,
    ToolResult,
    Summary,
}

/// Message body. Plain text, or a structured tool block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        name: String,
        result: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Plain-text rendering used by the default formatter and by the
    /// summarization transcript.
    pub fn render(&self) -> String {
        match self {
            MessageContent::Text { text } => text.clone(),
            MessageContent::ToolUse { name, arguments } => format!(
                "<tool_call>{}</tool_call>",
                serde_json::json!({ "name": name, "arguments": arguments })
            ),
            MessageContent::ToolResult { result, .. } => result.clone(),
        }
    }
}

/// Bookkeeping attached to every stored message. Never sent to the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub timestamp: DateTime<Utc>,
    /// Estimated at insertion and never recomputed.
    pub token_count: usize,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// A message owned by the [`MemoryStore`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemoryMessage {
    pub role: MessageRole,
    pub content: MessageContent,
    pub metadata: MessageMetadata,
}

impl MemoryMessage {
    pub fn message_type(&self) -> MessageType {
        self.metadata.message_type
    }

    pub fn token_count(&self) -> usize {
        self.metadata.token_count
    }
}

/// A message waiting to be inserted. [`MemoryStore::add`] stamps it with a
/// timestamp and token estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageDraft {
    pub role: MessageRole,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub step_id: Option<String>,
}

impl MessageDraft {
    pub fn new(role: MessageRole, content: MessageContent, message_type: MessageType) -> Self {
        Self {
            role,
            content,
            message_type,
            step_id: None,
        }
    }

    /// Convenience constructor for a text message.
    pub fn text(role: MessageRole, text: impl Into<String>, message_type: MessageType) -> Self {
        Self::new(role, MessageContent::text(text), message_type)
    }

    /// Attribute the message to a workflow step.
    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Stamp with the current time and a frozen token estimate.
    pub fn stamp(self) -> MemoryMessage {
        let token_count = tokens::estimate_message_tokens(&self.content);
        MemoryMessage {
            role: self.role,
            content: self.content,
            metadata: MessageMetadata {
                timestamp: Utc::now(),
                token_count,
                message_type: self.message_type,
                step_id: self.step_id,
            },
        }
    }
}

// ── Formatting ─────────────────────────────────────────────────────

/// Projects stored messages onto the wire format a model family expects.
pub trait MessageFormatter: Send + Sync {
    fn format(&self, message: &MemoryMessage) -> Message;
}

/// Role + rendered text. Tool-use blocks become `<tool_call>` tags, tool
/// results become their raw result text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFormatter;

impl MessageFormatter for PlainFormatter {
    fn format(&self, message: &MemoryMessage) -> Message {
        Message::new(message.role, message.content.render())
    }
}

// ── Metrics ────────────────────────────────────────────────────────

/// Snapshot of store size and compression history.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    /// Messages matching the type filter (all messages when unfiltered).
    pub message_count: usize,
    /// Estimated tokens of the whole log. The type filter never applies here.
    pub estimated_tokens: usize,
    pub compression_count: usize,
    pub last_compression_time: Option<DateTime<Utc>>,
}

impl MemoryMetrics {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "memory: {} messages, ~{} tokens, {} compressions",
            self.message_count, self.estimated_tokens, self.compression_count
        )
    }
}

// ── Store ──────────────────────────────────────────────────────────

/// Ordered message log with checkpoints and budget-triggered compression.
///
/// ```ignore
/// let mut memory = MemoryStore::new(MemoryConfig::default().with_max_tokens(4096));
/// memory
///     .add(vec![MessageDraft::text(MessageRole::User, "hi", MessageType::UserPrompt)], &session, &NoopHandler)
///     .await;
///
/// memory.create_checkpoint("step-1");
/// memory.add_uncompressed(vec![/* step instruction */]);
/// memory.rollback_to_checkpoint("step-1");
/// ```
pub struct MemoryStore {
    messages: Vec<MemoryMessage>,
    /// Latest snapshot per checkpoint id. Only the most recent attempt of a
    /// step is ever rolled back to, so older snapshots are replaced.
    checkpoints: HashMap<String, Vec<MemoryMessage>>,
    config: MemoryConfig,
    strategy: Box<dyn CompressionStrategy>,
    formatter: Box<dyn MessageFormatter>,
    compression_count: usize,
    last_compression_time: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("messages", &self.messages.len())
            .field("checkpoints", &self.checkpoints.keys().collect::<Vec<_>>())
            .field("strategy", &self.strategy.name())
            .field("compression_count", &self.compression_count)
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store using the strategy named in `config.compression`.
    pub fn new(config: MemoryConfig) -> Self {
        let strategy = config.compression.build();
        Self {
            messages: Vec::new(),
            checkpoints: HashMap::new(),
            config,
            strategy,
            formatter: Box::new(PlainFormatter),
            compression_count: 0,
            last_compression_time: None,
        }
    }

    /// Replace the compression strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn CompressionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the wire formatter used by [`messages()`](Self::messages).
    pub fn with_formatter(mut self, formatter: Box<dyn MessageFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Append messages, then compress if the log has grown past the threshold.
    pub async fn add(
        &mut self,
        drafts: Vec<MessageDraft>,
        session: &dyn GenerationSession,
        events: &dyn EventHandler,
    ) {
        self.add_uncompressed(drafts);
        self.compress_if_needed(session, events).await;
    }

    /// Append messages without evaluating compression.
    ///
    /// Used for a step's own instruction, which must not be dropped by the
    /// compression it might provoke.
    pub fn add_uncompressed(&mut self, drafts: Vec<MessageDraft>) {
        for draft in drafts {
            let message = draft.stamp();
            debug!(
                "memory add: type={:?}, tokens={}",
                message.metadata.message_type, message.metadata.token_count
            );
            self.messages.push(message);
        }
    }

    /// The full log projected through the formatter, ready for the model.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| self.formatter.format(m))
            .collect()
    }

    /// The raw log including metadata.
    pub fn entries(&self) -> &[MemoryMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of frozen per-message token estimates over the whole log.
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(MemoryMessage::token_count).sum()
    }

    /// Size and compression metrics. `type_filter` narrows `message_count`
    /// only; `estimated_tokens` always covers the entire log.
    pub fn metrics(&self, type_filter: Option<&[MessageType]>) -> MemoryMetrics {
        let message_count = match type_filter {
            Some(types) => self
                .messages
                .iter()
                .filter(|m| types.contains(&m.metadata.message_type))
                .count(),
            None => self.messages.len(),
        };
        MemoryMetrics {
            message_count,
            estimated_tokens: self.estimated_tokens(),
            compression_count: self.compression_count,
            last_compression_time: self.last_compression_time,
        }
    }

    /// Snapshot the log under `id`, replacing any earlier snapshot with the
    /// same id.
    pub fn create_checkpoint(&mut self, id: &str) {
        debug!(
            "checkpoint {id}: {} messages, ~{} tokens",
            self.messages.len(),
            self.estimated_tokens()
        );
        self.checkpoints.insert(id.to_string(), self.messages.clone());
    }

    /// Restore the log from the snapshot under `id`. Unknown ids log a
    /// warning and leave the log untouched. Returns whether a snapshot was
    /// restored.
    pub fn rollback_to_checkpoint(&mut self, id: &str) -> bool {
        match self.checkpoints.get(id) {
            Some(snapshot) => {
                debug!(
                    "rollback {id}: {} -> {} messages",
                    self.messages.len(),
                    snapshot.len()
                );
                self.messages = snapshot.clone();
                true
            }
            None => {
                warn!("rollback requested for unknown checkpoint '{id}', ignoring");
                false
            }
        }
    }

    pub fn has_checkpoint(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    /// Number of retained snapshots (at most one per id).
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Empty the log and all checkpoints and reset compression counters.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.checkpoints.clear();
        self.compression_count = 0;
        self.last_compression_time = None;
    }

    /// Whether the log currently exceeds `max_tokens * compression_threshold`.
    pub fn over_threshold(&self) -> bool {
        self.estimated_tokens() as f64 > self.config.compression_trigger_tokens()
    }

    /// Run the compression strategy if the log is over threshold.
    ///
    /// On success the strategy's output replaces the log in one assignment.
    /// On failure the log is left exactly as it was. Returns `true` when
    /// the log was replaced.
    pub async fn compress_if_needed(
        &mut self,
        session: &dyn GenerationSession,
        events: &dyn EventHandler,
    ) -> bool {
        if !self.over_threshold() {
            return false;
        }

        let target_tokens = self.config.target_tokens();
        let tokens_before = self.estimated_tokens();
        let messages_before = self.messages.len();
        let strategy = self.strategy.name();
        info!(
            "compressing memory: strategy={strategy}, ~{tokens_before} tokens > threshold, target={target_tokens}"
        );

        let outcome = self
            .strategy
            .compress(
                &self.messages,
                target_tokens,
                &self.config.preserve_message_types,
                session,
            )
            .await;

        match outcome {
            Ok(compressed) => {
                self.messages = compressed;
                self.compression_count += 1;
                self.last_compression_time = Some(Utc::now());
                let tokens_after = self.estimated_tokens();
                info!(
                    "memory compressed: {messages_before} -> {} messages, ~{tokens_before} -> ~{tokens_after} tokens",
                    self.messages.len()
                );
                events.on_event(&WorkflowEvent::Compressed {
                    strategy,
                    tokens_before,
                    tokens_after,
                    messages_before,
                    messages_after: self.messages.len(),
                });
                true
            }
            Err(e) => {
                let error = e.to_string();
                warn!("memory compression failed ({strategy}): {error}. Keeping log as-is.");
                events.on_event(&WorkflowEvent::CompressionFailed {
                    strategy,
                    error: &error,
                });
                false
            }
        }
    }
}
