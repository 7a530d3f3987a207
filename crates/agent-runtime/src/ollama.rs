//! Ollama Chat Provider
//!
//! Streams NDJSON from a local Ollama server's `/api/chat` endpoint. Old
//! servers without the chat endpoint fall back to `/api/generate` with a
//! role-prefixed flattened prompt.
//!
//! Native reasoning tokens (the `thinking` field) are re-emitted as text
//! wrapped in the `<think>`/`</think>` markers, and structured `tool_calls`
//! become tool-call fragments, so the orchestrator sees the same shapes
//! from every backend.

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
use agent_core::reasoning::{THINK_CLOSE, THINK_OPEN};

use crate::wire::pump_lines;

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    pub base_url: String,

    /// Idle read timeout between stream chunks, in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost:11434".into());
        Self {
            base_url,
            ..Default::default()
        }
    }
}

/// Ollama chat provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a provider for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(OllamaConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Convert agent messages to the Ollama chat format
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Tool => json!({
                    "role": "tool",
                    "content": m.content,
                }),
                Role::Assistant if m.tool_call_id.is_some() => json!({
                    "role": "assistant",
                    "content": m.content,
                    "tool_calls": [{
                        "function": {
                            "name": m.tool_name.clone().unwrap_or_default(),
                            "arguments": m.tool_arguments.clone().unwrap_or_default(),
                        }
                    }],
                }),
                _ => json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                }),
            })
            .collect()
    }

    fn build_options(options: &GenerationOptions) -> Value {
        json!({
            "temperature": options.temperature,
            "top_p": options.top_p,
            "num_predict": options.max_tokens,
        })
    }

    async fn stream_generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<FragmentStream> {
        let payload = json!({
            "model": options.model,
            "prompt": flatten_messages(messages),
            "stream": true,
            "options": Self::build_options(options),
        });

        let response = self
            .client
            .post(self.endpoint("/api/generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_lines(response, tx, parse_generate_line));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".into(),
            supports_tools: true,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.endpoint("/api/tags")).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(err) => {
                tracing::warn!(%err, "ollama health check failed");
                Ok(false)
            }
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
            "options": Self::build_options(options),
        });

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // old server without the chat endpoint
            tracing::debug!("chat endpoint missing, falling back to generate");
            return self.stream_generate(messages, options).await;
        }
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut state = ChatLineState::default();
        tokio::spawn(pump_lines(response, tx, move |line| {
            parse_chat_line(line, &mut state)
        }));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = extract_error(&body).unwrap_or(body);
    Err(AgentError::Transport(format!("HTTP {status}: {detail}")))
}

fn extract_error(body: &str) -> Option<String> {
    let data: Value = serde_json::from_str(body).ok()?;
    data.get("error")?.as_str().map(ToString::to_string)
}

/// Per-stream state carried across NDJSON lines
#[derive(Default)]
struct ChatLineState {
    in_thinking: bool,
    call_index: usize,
}

/// Parse one `/api/chat` NDJSON line into fragments.
///
/// Returns the fragments plus whether the stream is finished.
fn parse_chat_line(line: &str, state: &mut ChatLineState) -> Result<(Vec<RawFragment>, bool)> {
    let data: Value = serde_json::from_str(line)
        .map_err(|e| AgentError::Protocol(format!("bad stream line: {e}")))?;

    if let Some(error) = data.get("error").and_then(Value::as_str) {
        return Err(AgentError::Transport(error.to_string()));
    }

    let mut fragments = Vec::new();
    let message = data.get("message").cloned().unwrap_or(Value::Null);

    let thinking = message
        .get("thinking")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if !thinking.is_empty() {
        if !state.in_thinking {
            fragments.push(RawFragment::Text(THINK_OPEN.to_string()));
            state.in_thinking = true;
        }
        fragments.push(RawFragment::Text(thinking.to_string()));
    } else if state.in_thinking && !content.is_empty() {
        fragments.push(RawFragment::Text(format!("{THINK_CLOSE}\n")));
        state.in_thinking = false;
    }

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let Some(name) = function.get("name").and_then(Value::as_str) else {
                continue;
            };
            let raw_arguments = match function.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "{}".into(),
            };
            fragments.push(RawFragment::ToolCallDelta {
                index: state.call_index,
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                name: Some(name.to_string()),
                arguments: raw_arguments,
            });
            state.call_index += 1;
        }
    }

    if !content.is_empty() {
        fragments.push(RawFragment::Text(content.to_string()));
    }

    let done = data.get("done").and_then(Value::as_bool).unwrap_or(false);
    if done {
        if state.in_thinking {
            fragments.push(RawFragment::Text(format!("{THINK_CLOSE}\n")));
            state.in_thinking = false;
        }
        fragments.push(RawFragment::Done {
            usage: parse_usage(&data),
        });
    }

    Ok((fragments, done))
}

/// Parse one `/api/generate` NDJSON line
fn parse_generate_line(line: &str) -> Result<(Vec<RawFragment>, bool)> {
    let data: Value = serde_json::from_str(line)
        .map_err(|e| AgentError::Protocol(format!("bad stream line: {e}")))?;

    if let Some(error) = data.get("error").and_then(Value::as_str) {
        return Err(AgentError::Transport(error.to_string()));
    }

    let mut fragments = Vec::new();
    if let Some(chunk) = data.get("response").and_then(Value::as_str) {
        if !chunk.is_empty() {
            fragments.push(RawFragment::Text(chunk.to_string()));
        }
    }

    let done = data.get("done").and_then(Value::as_bool).unwrap_or(false);
    if done {
        fragments.push(RawFragment::Done {
            usage: parse_usage(&data),
        });
    }
    Ok((fragments, done))
}

fn parse_usage(data: &Value) -> Option<TokenUsage> {
    let prompt = data
        .get("prompt_eval_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let completion = data.get("eval_count").and_then(Value::as_u64).unwrap_or(0) as u32;
    let total = prompt + completion;
    (total > 0).then_some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

/// Flatten a message history into a role-prefixed prompt for `/api/generate`
fn flatten_messages(messages: &[Message]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for message in messages {
        if message.content.is_empty() {
            continue;
        }
        let prefix = match message.role {
            Role::System => "System",
            Role::Assistant => "Assistant",
            _ => "User",
        };
        parts.push(format!("{prefix}: {}", message.content));
    }
    parts.push("Assistant:".into());
    parts.join("\n\n")
}
