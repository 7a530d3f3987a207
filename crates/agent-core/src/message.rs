//! Conversation Messages
//!
//! Message history shared between the orchestrator, providers, and session
//! persistence. Insertion order is meaningful: it is the literal context
//! sent to the provider on every request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (answers a prior assistant tool call)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Token usage reported by a provider for one completion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (may be empty for a pure tool-call message)
    pub content: String,

    /// Tool name, set on tool results and on assistant messages carrying
    /// a pending tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Call id linking a tool result to the assistant message that
    /// requested it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Parsed tool arguments on an assistant message carrying a pending call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_arguments: Option<serde_json::Map<String, serde_json::Value>>,

    /// Usage reported for the completion that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            tool_arguments: None,
            usage: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool-result message answering the given call id
    pub fn tool(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_name = Some(tool_name.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach a pending tool call to an assistant message
    pub fn with_tool_call(
        mut self,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        self.tool_name = Some(tool_name.into());
        self.tool_call_id = Some(tool_call_id.into());
        self.tool_arguments = tool_arguments;
        self
    }

    /// Attach provider usage to the message
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Whether this assistant message carries an unanswered tool call
    pub fn is_tool_call(&self) -> bool {
        self.role == Role::Assistant && self.tool_call_id.is_some()
    }
}

fn default_truncate() -> bool {
    true
}

/// Append-only conversation history with per-session bookkeeping.
///
/// Mutated only by the orchestrator; everything else sees snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Completed user turns
    #[serde(default)]
    turns: u32,

    /// Whether tool output is truncated before re-entering the context
    #[serde(default = "default_truncate")]
    truncate_output: bool,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            turns: 0,
            truncate_output: true,
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Append a message; history is never reordered or rewritten
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Immutable copy of the history for transmission to a provider
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Last `limit` messages, for display only
    pub fn tail(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Replace the system prompt, inserting it if the history has none
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = prompt.into();
            }
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// Record the start of a user turn, returning the new turn number
    pub fn begin_turn(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn truncation_enabled(&self) -> bool {
        self.truncate_output
    }

    pub fn set_truncation(&mut self, enabled: bool) {
        self.truncate_output = enabled;
    }

    /// Sum of the usage reported by providers across the session
    pub fn usage_totals(&self) -> TokenUsage {
        let mut totals = TokenUsage::default();
        for usage in self.messages.iter().filter_map(|m| m.usage.as_ref()) {
            totals.accumulate(usage);
        }
        totals
    }

    /// Rough size estimate used when no provider usage was reported
    pub fn word_count(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_tool_message_links_call_id() {
        let msg = Message::tool("exit code 0", "run_shell", "call-1");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("run_shell"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn test_conversation_order_and_tail() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.tail(2).len(), 2);
        assert_eq!(conv.tail(2)[0].role, Role::User);
        assert_eq!(conv.tail(10).len(), 3);
    }

    #[test]
    fn test_set_system_prompt_replaces_or_inserts() {
        let mut conv = Conversation::new();
        conv.push(Message::user("Hi"));
        conv.set_system_prompt("first");
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[0].content, "first");

        conv.set_system_prompt("second");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content, "second");
    }

    #[test]
    fn test_usage_totals() {
        let mut conv = Conversation::new();
        conv.push(Message::assistant("a").with_usage(Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        })));
        conv.push(Message::assistant("b").with_usage(Some(TokenUsage {
            prompt_tokens: 20,
            completion_tokens: 5,
            total_tokens: 25,
        })));

        let totals = conv.usage_totals();
        assert_eq!(totals.prompt_tokens, 30);
        assert_eq!(totals.total_tokens, 40);
    }

    #[test]
    fn test_serde_round_trip_preserves_tool_fields() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.push(
            Message::assistant("").with_tool_call("run_shell", "call-7", None),
        );
        conv.push(Message::tool("ok", "run_shell", "call-7"));

        let json = serde_json::to_string(&conv).unwrap();
        let restored: Conversation = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.messages()[1].tool_call_id.as_deref(), Some("call-7"));
        assert_eq!(restored.messages()[2].tool_call_id.as_deref(), Some("call-7"));
        assert_eq!(restored.messages()[2].role, Role::Tool);
    }
}
