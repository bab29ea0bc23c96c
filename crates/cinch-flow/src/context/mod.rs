//! Context management: token estimation, the memory store, and compression.
//!
//! 1. **[`tokens`]** — the character-based token heuristic every budget check
//!    uses.
//! 2. **[`store`]** — [`MemoryStore`], the run's message log with checkpoints,
//!    rollback and budget-driven compression.
//! 3. **[`compression`]** — the [`CompressionStrategy`] trait and the
//!    configuration that selects one:
//!    - **[`window`]** — keep anchors plus the newest messages that fit.
//!    - **[`summarizer`]** — collapse everything into one model-written summary.

pub mod compression;
pub mod store;
pub mod summarizer;
pub mod tokens;
pub mod window;

pub use compression::{CompressionConfig, CompressionError, CompressionStrategy};
pub use store::{
    MemoryMessage, MemoryMetrics, MemoryStore, MessageContent, MessageDraft, MessageFormatter,
    MessageType, PlainFormatter,
};
pub use summarizer::Summarizer;
pub use tokens::{estimate_message_tokens, estimate_tokens};
pub use window::RecencyWindow;
