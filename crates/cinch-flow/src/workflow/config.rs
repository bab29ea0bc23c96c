//! Configuration for the memory store and the workflow executor.
//!
//! Both structs deserialize from camelCase JSON and build in code with
//! `with_*` methods:
//!
//! ```ignore
//! let config = ExecutorConfig::default()
//!     .with_memory(
//!         MemoryConfig::default()
//!             .with_max_tokens(16_384)
//!             .with_compression_threshold(0.75)
//!             .with_compression(CompressionConfig::summarization()),
//!     )
//!     .with_tool_arg_validation(false);
//! ```

use serde::{Deserialize, Serialize};

use super::definition::DefinitionError;
use crate::context::compression::CompressionConfig;
use crate::context::store::MessageType;

/// Default token budget for the memory log.
pub const DEFAULT_MAX_TOKENS: usize = 8192;

/// Default fraction of the budget at which compression triggers.
pub const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.8;

/// Fraction of the budget compression aims for.
pub const TARGET_RATIO: f64 = 0.7;

// ── MemoryConfig ───────────────────────────────────────────────────

/// Budget and compression settings for a [`MemoryStore`](crate::context::store::MemoryStore).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub max_tokens: usize,
    /// Compression runs once the log exceeds `max_tokens * compression_threshold`.
    pub compression_threshold: f64,
    /// Message types the recency window always keeps.
    pub preserve_message_types: Vec<MessageType>,
    pub compression: CompressionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            preserve_message_types: vec![MessageType::SystemInstruction, MessageType::UserPrompt],
            compression: CompressionConfig::default(),
        }
    }
}

impl MemoryConfig {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: f64) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_preserve_types(mut self, types: Vec<MessageType>) -> Self {
        self.preserve_message_types = types;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Token count above which compression runs.
    pub fn compression_trigger_tokens(&self) -> f64 {
        self.max_tokens as f64 * self.compression_threshold
    }

    /// Token target handed to the compression strategy: `floor(max_tokens * 0.7)`.
    pub fn target_tokens(&self) -> usize {
        (self.max_tokens as f64 * TARGET_RATIO).floor() as usize
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        let t = self.compression_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(DefinitionError::InvalidThreshold(t));
        }
        Ok(())
    }
}

// ── ExecutorConfig ─────────────────────────────────────────────────

/// Settings for a [`WorkflowExecutor`](super::executor::WorkflowExecutor) run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    pub memory: MemoryConfig,
    /// Check parsed tool arguments against the tool's JSON schema before running it.
    pub validate_tool_args: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            validate_tool_args: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_tool_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_tool_args = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.compression_threshold, 0.8);
        assert_eq!(
            config.preserve_message_types,
            vec![MessageType::SystemInstruction, MessageType::UserPrompt]
        );
        assert_eq!(config.compression, CompressionConfig::SlidingWindow);
        assert!(ExecutorConfig::default().validate_tool_args);
    }

    #[test]
    fn target_is_floor_of_seventy_percent() {
        assert_eq!(MemoryConfig::default().with_max_tokens(1000).target_tokens(), 700);
        assert_eq!(MemoryConfig::default().with_max_tokens(15).target_tokens(), 10);
    }

    #[test]
    fn trigger_uses_threshold() {
        let config = MemoryConfig::default()
            .with_max_tokens(1000)
            .with_compression_threshold(0.5);
        assert_eq!(config.compression_trigger_tokens(), 500.0);
    }

    #[test]
    fn threshold_must_be_in_unit_interval() {
        assert!(MemoryConfig::default().validate().is_ok());
        assert!(MemoryConfig::default().with_compression_threshold(1.0).validate().is_ok());
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let err = MemoryConfig::default()
                .with_compression_threshold(bad)
                .validate();
            assert!(matches!(err, Err(DefinitionError::InvalidThreshold(_))));
        }
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let config: ExecutorConfig = serde_json::from_str(
            r#"{
                "memory": {
                    "maxTokens": 2048,
                    "preserveMessageTypes": ["system_instruction"],
                    "compression": {"name": "summarization", "temperature": 0.1}
                },
                "validateToolArgs": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.memory.max_tokens, 2048);
        assert_eq!(config.memory.compression_threshold, 0.8);
        assert_eq!(
            config.memory.preserve_message_types,
            vec![MessageType::SystemInstruction]
        );
        assert!(!config.validate_tool_args);
        assert_eq!(config.memory.compression.build().name(), "summarization");
    }
}
