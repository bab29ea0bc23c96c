//! Pluggable compression strategies for the [`MemoryStore`](super::store::MemoryStore).
//!
//! A strategy receives the full log, a token target, and the message types
//! the caller wants preserved, and returns a replacement log. Two
//! implementations ship with the crate:
//!
//! - [`RecencyWindow`](super::window::RecencyWindow) (`sliding-window`) —
//!   keeps preserved messages plus the newest suffix that fits the budget.
//!   No model call.
//! - [`Summarizer`](super::summarizer::Summarizer) (`summarization`) —
//!   collapses the whole log into one summary message via the live
//!   generation session. Ignores the preserved types; see
//!   [`CompressionStrategy::honors_preserved_types`].

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::store::{MemoryMessage, MessageType};
use super::summarizer::Summarizer;
use super::window::RecencyWindow;
use crate::api::session::GenerationSession;

/// Errors a strategy can report. The store logs them and keeps the old log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompressionError {
    #[error("summary generation failed: {0}")]
    Generation(String),
    #[error("summary generation returned no text")]
    EmptySummary,
}

/// Boxed future returned by [`CompressionStrategy::compress`].
pub type CompressFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<MemoryMessage>, CompressionError>> + Send + 'a>>;

/// A compression algorithm. Stateless between calls; anything a strategy
/// needs at call time (such as the generation session) is passed in.
pub trait CompressionStrategy: Send + Sync {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Whether messages whose type is in `preserve` are guaranteed to survive.
    ///
    /// The summarization strategy returns `false`: it collapses everything,
    /// anchors included, and callers that depend on a system or user anchor
    /// must re-inject it after compression.
    fn honors_preserved_types(&self) -> bool {
        true
    }

    /// Produce a replacement log aiming at `target_tokens`.
    fn compress<'a>(
        &'a self,
        messages: &'a [MemoryMessage],
        target_tokens: usize,
        preserve: &'a [MessageType],
        session: &'a dyn GenerationSession,
    ) -> CompressFuture<'a>;
}

/// Strategy selection as it appears in configuration.
///
/// ```json
/// {"name": "sliding-window"}
/// {"name": "summarization", "temperature": 0.1, "maxSummaryTokens": 256}
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(
    tag = "name",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum CompressionConfig {
    #[default]
    SlidingWindow,
    Summarization {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_summary_tokens: Option<u32>,
    },
}

impl CompressionConfig {
    /// Summarization with all defaults.
    pub fn summarization() -> Self {
        CompressionConfig::Summarization {
            system_prompt: None,
            temperature: None,
            max_summary_tokens: None,
        }
    }

    /// Instantiate the configured strategy.
    pub fn build(&self) -> Box<dyn CompressionStrategy> {
        match self {
            CompressionConfig::SlidingWindow => Box::new(RecencyWindow),
            CompressionConfig::Summarization {
                system_prompt,
                temperature,
                max_summary_tokens,
            } => {
                let mut summarizer = Summarizer::default();
                if let Some(prompt) = system_prompt {
                    summarizer = summarizer.with_system_prompt(prompt.clone());
                }
                if let Some(t) = temperature {
                    summarizer = summarizer.with_temperature(*t);
                }
                if let Some(max) = max_summary_tokens {
                    summarizer = summarizer.with_max_summary_tokens(*max);
                }
                Box::new(summarizer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_config_from_json() {
        let config: CompressionConfig =
            serde_json::from_str(r#"{"name": "sliding-window"}"#).unwrap();
        assert_eq!(config, CompressionConfig::SlidingWindow);
        assert_eq!(config.build().name(), "sliding-window");
    }

    #[test]
    fn summarization_config_from_json() {
        let config: CompressionConfig = serde_json::from_str(
            r#"{"name": "summarization", "systemPrompt": "Be brief.", "maxSummaryTokens": 128}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            CompressionConfig::Summarization {
                system_prompt: Some("Be brief.".into()),
                temperature: None,
                max_summary_tokens: Some(128),
            }
        );
        let strategy = config.build();
        assert_eq!(strategy.name(), "summarization");
        assert!(!strategy.honors_preserved_types());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let parsed = serde_json::from_str::<CompressionConfig>(r#"{"name": "zip"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn default_is_sliding_window() {
        assert_eq!(CompressionConfig::default(), CompressionConfig::SlidingWindow);
        assert!(CompressionConfig::default().build().honors_preserved_types());
    }
}
