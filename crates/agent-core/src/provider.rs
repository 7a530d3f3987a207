//! Chat Provider Contract
//!
//! Common interface for all model backends (Ollama, OpenAI-compatible, ...).
//! A provider turns a message history into a lazy stream of raw fragments;
//! the orchestrator never sees backend-specific framing. Fragment streams
//! are consumed through [`crate::stream::StreamNormalizer`].

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::message::{Message, TokenUsage};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "qwen3:14b", "gpt-4o-mini")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "qwen3:14b".into(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// One raw piece of a streamed provider response.
///
/// This is the narrow waist between backend framing (NDJSON lines, SSE
/// events) and the normalized event stream. Providers that surface model
/// reasoning as a separate field re-emit it as text wrapped in the
/// `<think>`/`</think>` marker pair so downstream handling is uniform.
#[derive(Clone, Debug, PartialEq)]
pub enum RawFragment {
    /// Incremental response text
    Text(String),

    /// Part of a structured tool call. Backends that stream call arguments
    /// as partial JSON send several deltas with the same `index`; backends
    /// that deliver whole calls send one delta per call.
    ToolCallDelta {
        /// Position of the call within the response, used to group deltas
        index: usize,
        /// Call id, usually present only on the first delta
        id: Option<String>,
        /// Tool name, usually present only on the first delta
        name: Option<String>,
        /// Argument payload fragment (possibly partial JSON text)
        arguments: String,
    },

    /// Explicit end-of-stream marker
    Done { usage: Option<TokenUsage> },
}

/// Lazy, finite, forward-only fragment stream for one provider request
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<RawFragment>> + Send>>;

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "ollama", "openai")
    pub name: String,

    /// Whether the backend emits structured tool calls natively
    pub supports_tools: bool,
}

/// Strategy trait for chat backends.
///
/// Implement this trait to add support for a new backend. The orchestrator
/// works exclusively through this interface.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Static provider information and capabilities
    fn info(&self) -> ProviderInfo;

    /// Check that the backend is reachable and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Start a streaming chat request for the given history.
    ///
    /// Transport-level failures must surface as `Err`, either here or as an
    /// `Err` item inside the stream; a provider never silently truncates.
    async fn stream_chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<FragmentStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "qwen3:14b");
    }
}
