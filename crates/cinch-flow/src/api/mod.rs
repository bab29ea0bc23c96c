//! Model interaction layer: the generation session contract and its
//! implementations.
//!
//! - [`session`] — [`GenerationSession`], [`GenerationRequest`],
//!   [`TokenChunk`] and the scripted test double [`ScriptedSession`].
//! - [`streaming`] — incremental SSE decoding and reasoning-markup stripping.
//! - [`openrouter`] — [`OpenRouterSession`], a streaming HTTP session for
//!   OpenRouter or any OpenAI-compatible endpoint.

pub mod openrouter;
pub mod session;
pub mod streaming;

pub use openrouter::OpenRouterSession;
pub use session::{
    GenerationRequest, GenerationSession, ScriptedReply, ScriptedSession, TokenChunk, TokenStream,
    collect_stream,
};
pub use streaming::strip_reasoning;
