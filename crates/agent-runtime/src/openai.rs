//! OpenAI-Compatible Chat Provider
//!
//! SSE streaming against `/chat/completions` endpoints. Works for OpenAI
//! itself and for compatible APIs such as Mistral; only the base URL and
//! the reported provider name differ.
//!
//! Tool-call arguments arrive as partial JSON text spread over several
//! deltas; they are forwarded as indexed fragments and reassembled by the
//! stream normalizer.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use agent_core::error::{AgentError, Result};
use agent_core::message::{Message, Role, TokenUsage};
use agent_core::provider::{
    ChatProvider, FragmentStream, GenerationOptions, ProviderInfo, RawFragment,
};

use crate::wire::pump_lines;

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Idle read timeout between stream chunks, in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: 120,
        }
    }
}

/// Chat provider for OpenAI-compatible endpoints
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
    name: String,
}

impl OpenAiProvider {
    /// Create a provider with an explicit display name ("openai", "mistral", ...)
    pub fn with_name(name: impl Into<String>, config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            name: name.into(),
        }
    }

    /// Provider against the OpenAI API
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_name(
            "openai",
            OpenAiConfig::new("https://api.openai.com/v1", api_key),
        )
    }

    /// Provider against the Mistral API
    pub fn mistral(api_key: impl Into<String>) -> Self {
        Self::with_name(
            "mistral",
            OpenAiConfig::new("https://api.mistral.ai/v1", api_key),
        )
    }

    /// Convert agent messages to the chat-completions format
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                }),
                Role::Assistant if m.tool_call_id.is_some() => {
                    let arguments = m
                        .tool_arguments
                        .as_ref()
                        .and_then(|a| serde_json::to_string(a).ok())
                        .unwrap_or_else(|| "{}".into());
                    json!({
                        "role": "assistant",
                        "content": m.content,
                        "tool_calls": [{
                            "id": m.tool_call_id.clone().unwrap_or_default(),
                            "type": "function",
                            "function": {
                                "name": m.tool_name.clone().unwrap_or_default(),
                                "arguments": arguments,
                            }
                        }],
                    })
                }
                _ => json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                }),
            })
            .collect()
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            supports_tools: true,
        }
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<FragmentStream> {
        let payload = json!({
            "model": options.model,
            "messages": Self::convert_messages(messages),
            "stream": true,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
            "stream_options": {"include_usage": true},
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!("HTTP {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut state = SseState::default();
        tokio::spawn(pump_lines(response, tx, move |line| {
            parse_sse_line(line, &mut state)
        }));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Per-stream state carried across SSE lines
#[derive(Default)]
struct SseState {
    usage: Option<TokenUsage>,
}

/// Parse one SSE line into fragments.
///
/// Returns the fragments plus whether the stream is finished.
fn parse_sse_line(line: &str, state: &mut SseState) -> Result<(Vec<RawFragment>, bool)> {
    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if payload.is_empty() {
        return Ok((Vec::new(), false));
    }
    if payload == "[DONE]" {
        return Ok((
            vec![RawFragment::Done {
                usage: state.usage.take(),
            }],
            true,
        ));
    }

    // comment/heartbeat lines are not data
    if !payload.starts_with('{') {
        return Ok((Vec::new(), false));
    }

    let data: Value = serde_json::from_str(payload)
        .map_err(|e| AgentError::Protocol(format!("bad stream line: {e}")))?;

    if let Some(error) = data.get("error") {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string);
        return Err(AgentError::Transport(detail));
    }

    if let Some(usage) = data.get("usage").filter(|u| !u.is_null()) {
        state.usage = parse_usage(usage);
    }

    let mut fragments = Vec::new();
    if let Some(choices) = data.get("choices").and_then(Value::as_array) {
        for choice in choices {
            let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

            if let Some(content) = delta.get("content").and_then(Value::as_str) {
                if !content.is_empty() {
                    fragments.push(RawFragment::Text(content.to_string()));
                }
            }

            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for call in calls {
                    let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                    let function = call.get("function").cloned().unwrap_or(Value::Null);
                    fragments.push(RawFragment::ToolCallDelta {
                        index,
                        id: call
                            .get("id")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        name: function
                            .get("name")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        arguments: function
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
        }
    }

    Ok((fragments, false))
}

fn parse_usage(usage: &Value) -> Option<TokenUsage> {
    let prompt = usage
        .get("prompt_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let completion = usage
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(prompt + completion)) as u32;
    (total > 0).then_some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_delta() {
        let mut state = SseState::default();
        let line = r#"data: {"choices": [{"delta": {"content": "Hel"}}]}"#;
        let (fragments, done) = parse_sse_line(line, &mut state).unwrap();

        assert!(!done);
        assert_eq!(fragments, vec![RawFragment::Text("Hel".into())]);
    }

    #[test]
    fn test_tool_call_delta_sequence() {
        let mut state = SseState::default();

        let first = r#"data: {"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call-1", "function": {"name": "run_shell", "arguments": ""}}]}}]}"#;
        let (fragments, _) = parse_sse_line(first, &mut state).unwrap();
        assert_eq!(
            fragments,
            vec![RawFragment::ToolCallDelta {
                index: 0,
                id: Some("call-1".into()),
                name: Some("run_shell".into()),
                arguments: String::new(),
            }]
        );

        let second = r#"data: {"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"command\""}}]}}]}"#;
        let (fragments, _) = parse_sse_line(second, &mut state).unwrap();
        assert_eq!(
            fragments,
            vec![RawFragment::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "{\"command\"".into(),
            }]
        );
    }

    #[test]
    fn test_done_marker_carries_buffered_usage() {
        let mut state = SseState::default();
        let usage_line = r#"data: {"choices": [], "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}}"#;
        parse_sse_line(usage_line, &mut state).unwrap();

        let (fragments, done) = parse_sse_line("data: [DONE]", &mut state).unwrap();
        assert!(done);
        assert_eq!(
            fragments,
            vec![RawFragment::Done {
                usage: Some(TokenUsage {
                    prompt_tokens: 9,
                    completion_tokens: 4,
                    total_tokens: 13,
                })
            }]
        );
    }

    #[test]
    fn test_error_payload_is_transport() {
        let mut state = SseState::default();
        let line = r#"data: {"error": {"message": "invalid api key"}}"#;
        let err = parse_sse_line(line, &mut state).unwrap_err();
        match err {
            AgentError::Transport(detail) => assert_eq!(detail, "invalid api key"),
            other => panic!("expected transport error, got {other}"),
        }
    }

    #[test]
    fn test_tool_message_conversion() {
        let messages = vec![Message::tool("output", "run_shell", "call-9")];
        let converted = OpenAiProvider::convert_messages(&messages);
        assert_eq!(converted[0]["role"], "tool");
        assert_eq!(converted[0]["tool_call_id"], "call-9");
    }

    #[test]
    fn test_assistant_call_arguments_serialized_as_text() {
        let mut args = serde_json::Map::new();
        args.insert("command".into(), json!("ls"));
        let message = Message::assistant("").with_tool_call("run_shell", "call-2", Some(args));

        let converted = OpenAiProvider::convert_messages(&[message]);
        let function = &converted[0]["tool_calls"][0]["function"];
        assert_eq!(function["name"], "run_shell");
        assert_eq!(function["arguments"], "{\"command\":\"ls\"}");
    }
}
