//! # agent-runtime
//!
//! Chat provider backends for the agent CLI.
//!
//! ## Providers
//!
//! - **Ollama** (default): local inference over NDJSON streaming
//! - **OpenAI-compatible**: hosted `/chat/completions` SSE endpoints,
//!   covering OpenAI and Mistral
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{create_provider, ProviderKind, ProviderSettings};
//!
//! let provider = create_provider(&ProviderSettings {
//!     kind: ProviderKind::Ollama,
//!     endpoint: None,
//!     api_key: None,
//!     timeout_secs: 120,
//! })?;
//! ```

mod wire;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub mod factory;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

pub use factory::{ProviderKind, ProviderSettings, create_provider};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, ChatProvider, Conversation, GenerationOptions, Message, Result, Role,
};
