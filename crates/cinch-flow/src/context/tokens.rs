//! Heuristic token estimation.
//!
//! Every budget check in the crate runs on this estimate rather than a real
//! tokenizer: roughly four characters per token plus a small per-message
//! framing cost. Cheap, deterministic, and deliberately a little
//! conservative.

use super::store::{MemoryMessage, MessageContent};

/// Characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Characters charged for the role header of every message.
const ROLE_OVERHEAD_CHARS: usize = 4;

/// Characters charged for message delimiters and formatting.
const FORMAT_OVERHEAD_CHARS: usize = 4;

/// Extra characters charged for the structure of tool-use and tool-result blocks.
const TOOL_BLOCK_OVERHEAD_CHARS: usize = 20;

/// Tokens charged per message on top of the character estimate.
const TOKENS_PER_MESSAGE: usize = 2;

/// Characters a single content block contributes to the estimate.
pub fn content_chars(content: &MessageContent) -> usize {
    match content {
        MessageContent::Text { text } => text.chars().count(),
        MessageContent::ToolUse { name, arguments } => {
            let json = serde_json::json!({ "name": name, "arguments": arguments }).to_string();
            json.chars().count() + TOOL_BLOCK_OVERHEAD_CHARS
        }
        MessageContent::ToolResult { name, result } => {
            let json = serde_json::Value::String(result.clone()).to_string();
            name.chars().count() + json.chars().count() + TOOL_BLOCK_OVERHEAD_CHARS
        }
    }
}

/// Characters a message contributes, including role and formatting overhead.
pub fn message_chars(content: &MessageContent) -> usize {
    ROLE_OVERHEAD_CHARS + content_chars(content) + FORMAT_OVERHEAD_CHARS
}

/// Estimate tokens for a sequence of message contents:
/// `ceil(total_chars / 4) + 2 * message_count`.
pub fn estimate_content_tokens<'a>(contents: impl IntoIterator<Item = &'a MessageContent>) -> usize {
    let mut total_chars = 0;
    let mut count = 0;
    for content in contents {
        total_chars += message_chars(content);
        count += 1;
    }
    total_chars.div_ceil(CHARS_PER_TOKEN) + TOKENS_PER_MESSAGE * count
}

/// Estimate tokens for a list of stored messages.
pub fn estimate_tokens(messages: &[MemoryMessage]) -> usize {
    estimate_content_tokens(messages.iter().map(|m| &m.content))
}

/// Estimate tokens for a single message. This is the value frozen into
/// message metadata at insertion time.
pub fn estimate_message_tokens(content: &MessageContent) -> usize {
    estimate_content_tokens(std::iter::once(content))
}
