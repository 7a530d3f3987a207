//! # agent-core
//!
//! Core agent logic: provider-agnostic conversation orchestration with
//! streaming, an approval-gated tool system, and session state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Agent (turn loop)                    │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │   Stream     │  │     Tool       │  │   ChatProvider   │  │
//! │  │  Normalizer  │──│   Dispatcher   │──│   (Strategy)     │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────┘  │
//! │         │                  │                                 │
//! │  ┌──────────────┐  ┌────────────────┐                        │
//! │  │  Reasoning   │  │   Approval     │                        │
//! │  │  Splitter    │  │   Gate         │                        │
//! │  └──────────────┘  └────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ChatProvider` trait enables swapping between Ollama, OpenAI-style
//! endpoints, or any other backend without changing orchestration logic.
//! No tool runs without authorization: the dispatcher consults the
//! approval store and, failing that, the injected decision prompt.

pub mod agent;
pub mod approval;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod stream;
pub mod tool;

pub use agent::{Agent, AgentConfig, CancelToken, NullSink, TurnReport, TurnSink};
pub use approval::{ApprovalDecision, ApprovalPrompt, ApprovalStore};
pub use dispatch::{DispatchConfig, ToolDispatcher};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role, TokenUsage};
pub use provider::{ChatProvider, FragmentStream, GenerationOptions, RawFragment};
pub use reasoning::Channel;
pub use session::{Session, SessionId, SessionStore};
pub use stream::{StreamEvent, StreamNormalizer};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
