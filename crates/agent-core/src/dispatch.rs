//! Tool Call Dispatch
//!
//! Validates a tool call against the registry, applies the approval gate,
//! executes with a bounded timeout, and truncates output before it
//! re-enters the model's context. Every accepted or rejected call produces
//! exactly one result so the provider sees an answer for every call id.

use std::sync::Arc;
use std::time::Duration;

use crate::approval::{ApprovalDecision, ApprovalPrompt, ApprovalStore};
use crate::message::Conversation;
use crate::tool::{ToolCall, ToolError, ToolRegistry, ToolResult};

/// Dispatch limits
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Wall-clock budget for one tool execution
    pub tool_timeout: Duration,

    /// Character cap applied to tool output when truncation is enabled
    pub truncation_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(60),
            truncation_limit: 4000,
        }
    }
}

/// Dispatcher for tool invocation requests
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    approvals: Arc<dyn ApprovalStore>,
    prompt: Arc<dyn ApprovalPrompt>,
    config: DispatchConfig,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        approvals: Arc<dyn ApprovalStore>,
        prompt: Arc<dyn ApprovalPrompt>,
    ) -> Self {
        Self {
            registry,
            approvals,
            prompt,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one tool call to a result.
    ///
    /// Failures here are soft: lookup misses, bad arguments, denials,
    /// timeouts, and execution errors all come back as a failed
    /// [`ToolResult`] for the model to react to.
    pub async fn dispatch(&self, call: &ToolCall, conversation: &Conversation) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            tracing::debug!(tool = %call.name, "unknown tool requested");
            return ToolResult::failure(call, &ToolError::UnknownTool(call.name.clone()));
        };

        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(err) => return ToolResult::failure(call, &err),
        };
        if let Err(err) = tool.validate(&args) {
            return ToolResult::failure(call, &err);
        }

        if !self.approvals.is_allowed(&call.name) {
            let pretty = serde_json::to_string_pretty(&args).unwrap_or_else(|_| "{}".into());
            match self.prompt.prompt_decision(&call.name, &pretty).await {
                ApprovalDecision::Deny { reason } => {
                    tracing::info!(tool = %call.name, "tool execution denied");
                    return ToolResult::failure(call, &ToolError::Denied { reason });
                }
                ApprovalDecision::Always => {
                    if let Err(err) = self.approvals.allow(&call.name) {
                        tracing::warn!(tool = %call.name, %err, "failed to persist tool approval");
                    }
                }
                ApprovalDecision::Once => {}
            }
        }

        tracing::debug!(tool = %call.name, id = %call.id, "executing tool");
        let execution = tokio::time::timeout(self.config.tool_timeout, tool.execute(&args)).await;
        let output = match execution {
            Err(_) => {
                return ToolResult::failure(
                    call,
                    &ToolError::Timeout(self.config.tool_timeout.as_secs()),
                );
            }
            Ok(Err(err)) => return ToolResult::failure(call, &err),
            Ok(Ok(output)) => output,
        };

        if conversation.truncation_enabled() {
            let (text, truncated) = truncate_output(&output, self.config.truncation_limit);
            let mut result = ToolResult::success(call, text);
            result.truncated = truncated;
            result
        } else {
            ToolResult::success(call, output)
        }
    }
}

/// Deterministically cap `text` at `limit` characters.
///
/// Returns the possibly-shortened text and whether anything was dropped;
/// the marker records exactly how many characters were omitted.
pub fn truncate_output(text: &str, limit: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= limit {
        return (text.to_string(), false);
    }
    let kept: String = text.chars().take(limit).collect();
    let omitted = total - limit;
    (
        format!("{kept}\n...[truncated {omitted} characters]"),
        true,
    )
}
