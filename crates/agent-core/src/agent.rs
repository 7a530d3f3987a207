//! Conversation Orchestrator
//!
//! Drives one turn at a time: submit history, consume the normalized event
//! stream, dispatch tool calls behind the approval gate, append results,
//! resubmit — until the model produces a final answer or the turn fails.
//! The loop is an explicit state machine with a round-trip counter, not
//! recursion, so the loop-limit guarantee is trivially observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::dispatch::ToolDispatcher;
use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message, Role, TokenUsage};
use crate::provider::{ChatProvider, GenerationOptions, ProviderInfo};
use crate::reasoning::{Channel, ReasoningSplitter};
use crate::stream::{StreamEvent, StreamNormalizer};
use crate::tool::{ToolCall, ToolResult};

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous CLI agent. You may use the following tools when necessary:
{{tools}}

To call a tool respond with exactly:
<tool name="{tool_name}">
{JSON arguments}
</tool>

Do not include additional commentary when calling a tool.
IMPORTANT: tools always run from the same fixed working directory; cd does not persist between calls. Prefer absolute paths.
Each tool result is delivered back to you immediately, and you may call another tool right away if the output was not sufficient.
You are not a simple chatbot: keep calling tools until your objective is achieved.
When no tool is needed, respond directly to the user.
Continue the conversation after achieving the objective, or ask the user when clarification is needed."#;

/// Per-turn state of the orchestrator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    /// History submitted, waiting for the first fragment
    AwaitingResponse,
    /// Consuming normalized events
    Streaming,
    /// Running tool calls and appending their results
    DispatchingTool,
    /// Terminal: final answer accumulated
    Complete,
    /// Terminal: transport failure or loop limit
    Failed,
}

/// Cooperative cancellation flag for one turn.
///
/// Checked at event boundaries; a cancelled turn aborts the stream and
/// appends nothing partial.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished turn produced
#[derive(Clone, Debug)]
pub struct TurnReport {
    /// Accumulated answer-channel text
    pub answer: String,

    /// Tool round-trips performed
    pub tool_rounds: usize,

    /// Whether the turn was interrupted by the user
    pub cancelled: bool,
}

impl TurnReport {
    fn cancelled(tool_rounds: usize) -> Self {
        Self {
            answer: String::new(),
            tool_rounds,
            cancelled: true,
        }
    }
}

/// Receives live output while a turn runs; rendering is external
pub trait TurnSink: Send {
    /// A classified text chunk, in arrival order
    fn on_text(&mut self, channel: Channel, text: &str);

    /// A tool call about to be dispatched
    fn on_tool_call(&mut self, call: &ToolCall);

    /// The result of a dispatched call
    fn on_tool_result(&mut self, result: &ToolResult);
}

/// Sink that discards everything (tests, headless runs)
pub struct NullSink;

impl TurnSink for NullSink {
    fn on_text(&mut self, _channel: Channel, _text: &str) {}
    fn on_tool_call(&mut self, _call: &ToolCall) {}
    fn on_tool_result(&mut self, _result: &ToolResult) {}
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template; `{{tools}}` is replaced with the tool list
    pub system_prompt_template: Option<String>,

    /// Whether to render tool descriptions into the system prompt
    pub inject_tool_descriptions: bool,

    /// Maximum tool round-trips per turn before the turn fails
    pub max_tool_rounds: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Optional delay before each provider request (demo aid)
    pub inter_round_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt_template: None,
            inject_tool_descriptions: true,
            max_tool_rounds: 10,
            generation: GenerationOptions::default(),
            inter_round_delay: Duration::ZERO,
        }
    }
}

/// The conversation orchestrator
pub struct Agent {
    provider: Arc<dyn ChatProvider>,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Arc<dyn ChatProvider>, dispatcher: ToolDispatcher, config: AgentConfig) -> Self {
        Self {
            provider,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AgentConfig {
        &mut self.config
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn provider_info(&self) -> ProviderInfo {
        self.provider.info()
    }

    /// Render the full system prompt including tool descriptions
    pub fn build_system_prompt(&self) -> String {
        let tools = if self.config.inject_tool_descriptions {
            self.dispatcher.registry().describe_for_prompt()
        } else {
            String::new()
        };
        let template = self
            .config
            .system_prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        render_system_prompt(template, &tools)
    }

    /// Run one full turn to completion, failure, or cancellation.
    ///
    /// The caller has already appended the user message. On success the
    /// final assistant message is in the history and the report carries
    /// the answer-channel text. On error nothing half-finished was
    /// appended; the history is safe to retry.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        sink: &mut dyn TurnSink,
        cancel: &CancelToken,
    ) -> Result<TurnReport> {
        if conversation.messages().first().map(|m| m.role) != Some(Role::System) {
            conversation.set_system_prompt(self.build_system_prompt());
        }
        let turn = conversation.begin_turn();

        let mut rounds = 0usize;
        let mut answer = String::new();

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(turn, rounds, "turn cancelled before request");
                return Ok(TurnReport::cancelled(rounds));
            }
            if !self.config.inter_round_delay.is_zero() {
                tokio::time::sleep(self.config.inter_round_delay).await;
            }

            let mut phase = TurnPhase::AwaitingResponse;
            tracing::debug!(turn, rounds, ?phase, "requesting completion");
            let fragments = self
                .provider
                .stream_chat(&conversation.snapshot(), &self.config.generation)
                .await?;

            phase = TurnPhase::Streaming;
            tracing::trace!(?phase, "state transition");

            let mut normalizer = StreamNormalizer::new(fragments);
            let mut splitter = ReasoningSplitter::new();
            let mut raw_text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut usage: Option<TokenUsage> = None;

            while let Some(event) = normalizer.next_event().await {
                if cancel.is_cancelled() {
                    // abandon the stream; nothing was appended this round
                    tracing::debug!(turn, rounds, "turn cancelled mid-stream");
                    return Ok(TurnReport::cancelled(rounds));
                }
                match event {
                    StreamEvent::TextDelta(text) => {
                        raw_text.push_str(&text);
                        for (channel, chunk) in splitter.push(&text) {
                            if channel == Channel::Answer {
                                answer.push_str(&chunk);
                            }
                            sink.on_text(channel, &chunk);
                        }
                    }
                    StreamEvent::ToolCallRequest(call) => calls.push(call),
                    StreamEvent::TurnComplete { usage: reported } => {
                        usage = reported;
                        for (channel, chunk) in splitter.finish() {
                            if channel == Channel::Answer {
                                answer.push_str(&chunk);
                            }
                            sink.on_text(channel, &chunk);
                        }
                    }
                    StreamEvent::StreamError { detail } => {
                        phase = TurnPhase::Failed;
                        tracing::warn!(turn, ?phase, %detail, "stream failed");
                        return Err(AgentError::Transport(detail));
                    }
                }
            }

            // legacy fallback: scan the text only when the structured path
            // produced no call at all
            if calls.is_empty() {
                calls = parse_text_tool_calls(&raw_text);
                if !calls.is_empty() {
                    tracing::debug!(count = calls.len(), "tool calls recovered from text");
                }
            }

            let content = raw_text.trim().to_string();
            if calls.is_empty() {
                conversation.push(Message::assistant(content).with_usage(usage));
                phase = TurnPhase::Complete;
                tracing::debug!(turn, rounds, ?phase, "turn complete");
                return Ok(TurnReport {
                    answer: answer.trim().to_string(),
                    tool_rounds: rounds,
                    cancelled: false,
                });
            }

            rounds += 1;
            if rounds > self.config.max_tool_rounds {
                phase = TurnPhase::Failed;
                tracing::warn!(turn, ?phase, max = self.config.max_tool_rounds, "tool loop limit exceeded");
                return Err(AgentError::LoopLimit(self.config.max_tool_rounds));
            }

            phase = TurnPhase::DispatchingTool;
            tracing::trace!(?phase, "state transition");

            // record every pending call, then answer each one in order
            // before the next request is built
            let mut first = true;
            for call in &calls {
                let text = if first { content.clone() } else { String::new() };
                let args = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
                    &call.raw_arguments,
                )
                .ok();
                let mut message =
                    Message::assistant(text).with_tool_call(&call.name, &call.id, args);
                if first {
                    message.usage = usage.take();
                    first = false;
                }
                conversation.push(message);
            }

            for call in &calls {
                sink.on_tool_call(call);
                let result = self.dispatcher.dispatch(call, conversation).await;
                sink.on_tool_result(&result);
                conversation.push(result.to_message());
            }
        }
    }
}

static TEXT_TOOL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<tool name="(?P<name>[a-zA-Z0-9_\-]+)">\s*(?P<body>\{.*?\})\s*</tool>"#)
        .expect("tool call pattern is valid")
});

/// Recover tool calls embedded as plain text.
///
/// Legacy fallback for backends that cannot emit structured calls; invoked
/// only when the stream ended with none. Argument bodies are kept raw for
/// the dispatcher to validate.
pub fn parse_text_tool_calls(content: &str) -> Vec<ToolCall> {
    TEXT_TOOL_CALL
        .captures_iter(content)
        .map(|cap| ToolCall::new(&cap["name"], &cap["body"]))
        .collect()
}

fn render_system_prompt(template: &str, tool_descriptions: &str) -> String {
    template
        .replace("{{tools}}", tool_descriptions)
        .replace("{tool_descriptions}", tool_descriptions)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_text_tool_call() {
        let content = "Let me check.\n<tool name=\"run_shell\">\n{\"command\": \"ls\"}\n</tool>";
        let calls = parse_text_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "run_shell");
        assert_eq!(calls[0].raw_arguments, "{\"command\": \"ls\"}");
        assert!(!calls[0].id.is_empty());
    }

    #[test]
    fn test_parse_multiple_text_tool_calls() {
        let content = concat!(
            "<tool name=\"read_url\">{\"url\": \"https://a\"}</tool>\n",
            "<tool name=\"read_url\">{\"url\": \"https://b\"}</tool>",
        );
        let calls = parse_text_tool_calls(content);
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn test_parse_keeps_malformed_body_raw() {
        // body must at least look like a JSON object to match
        let content = "<tool name=\"run_shell\">{\"command\": }</tool>";
        let calls = parse_text_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].raw_arguments, "{\"command\": }");
    }

    #[test]
    fn test_plain_text_yields_no_calls() {
        assert!(parse_text_tool_calls("just an answer, no tools").is_empty());
        assert!(parse_text_tool_calls("<tool name=\"x\">not json</tool>").is_empty());
    }

    #[test]
    fn test_render_system_prompt() {
        let rendered = render_system_prompt("Tools:\n{{tools}}\nGo.", "- echo: echoes");
        assert_eq!(rendered, "Tools:\n- echo: echoes\nGo.");
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
