//! Recency-window compression: keep the preserved anchors plus the newest
//! contiguous run of messages that fits the remaining budget.
//!
//! Greedy and deterministic. Preserved messages keep their original relative
//! order and come first; the kept suffix follows in chronological order. A
//! message that fits the budget exactly is kept.

use tracing::debug;

use super::compression::{CompressFuture, CompressionStrategy};
use super::store::{MemoryMessage, MessageType};
use crate::api::session::GenerationSession;

/// The `sliding-window` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecencyWindow;

impl CompressionStrategy for RecencyWindow {
    fn name(&self) -> &'static str {
        "sliding-window"
    }

    fn compress<'a>(
        &'a self,
        messages: &'a [MemoryMessage],
        target_tokens: usize,
        preserve: &'a [MessageType],
        _session: &'a dyn GenerationSession,
    ) -> CompressFuture<'a> {
        let kept = select_recent(messages, target_tokens, preserve);
        Box::pin(async move { Ok(kept) })
    }
}

/// The window selection itself, usable without a session.
pub fn select_recent(
    messages: &[MemoryMessage],
    target_tokens: usize,
    preserve: &[MessageType],
) -> Vec<MemoryMessage> {
    let (priority, other): (Vec<&MemoryMessage>, Vec<&MemoryMessage>) = messages
        .iter()
        .partition(|m| preserve.contains(&m.metadata.message_type));

    let priority_tokens: usize = priority.iter().map(|m| m.token_count()).sum();
    let remaining_budget = target_tokens.saturating_sub(priority_tokens);

    let mut used = 0;
    let mut suffix: Vec<&MemoryMessage> = Vec::new();
    for message in other.iter().rev() {
        let next = used + message.token_count();
        if next > remaining_budget {
            break;
        }
        used = next;
        suffix.push(message);
    }
    suffix.reverse();

    debug!(
        "recency window: kept {} preserved (~{priority_tokens} tokens) + {} of {} recent (~{used} tokens), budget {target_tokens}",
        priority.len(),
        suffix.len(),
        other.len(),
    );

    priority
        .into_iter()
        .chain(suffix)
        .cloned()
        .collect()
}
