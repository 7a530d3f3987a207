//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Turn-fatal error conditions.
///
/// Tool-level failures are deliberately absent here: they are soft, become
/// result messages in the conversation, and never abort a turn. See
/// [`crate::tool::ToolError`].
#[derive(Error, Debug)]
pub enum AgentError {
    /// Provider unreachable, HTTP failure, or request timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed stream framing from a provider
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tool loop limit exceeded (safety valve against runaway tool cycles)
    #[error("tool loop limit exceeded after {0} round-trips")]
    LoopLimit(usize),

    /// Session persistence error
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether retrying the same turn may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Transport(_) | AgentError::Protocol(_) | AgentError::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Transport(msg) => {
                format!("The model backend could not be reached: {msg}")
            }
            AgentError::Protocol(msg) => {
                format!("The model backend sent an unreadable response: {msg}")
            }
            AgentError::LoopLimit(max) => format!(
                "The model kept requesting tools past the {max} round-trip limit; turn abandoned."
            ),
            AgentError::Session(msg) => format!("Session error: {msg}"),
            AgentError::Config(msg) => format!("Configuration error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}
