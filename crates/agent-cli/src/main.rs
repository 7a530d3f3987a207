//! Interactive terminal agent.
//!
//! Streams model output live, lets the model call local tools behind a
//! human-approval gate, and keeps the conversation resumable via saved
//! sessions.

mod approval;
mod commands;
mod display;
mod logging;
mod repl;
mod session;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use agent_core::agent::{Agent, AgentConfig};
use agent_core::dispatch::{DispatchConfig, ToolDispatcher};
use agent_core::message::Conversation;
use agent_core::provider::{ChatProvider, GenerationOptions};
use agent_runtime::{ProviderKind, ProviderSettings, create_provider};

use crate::approval::{ConsolePrompt, FileApprovalStore};
use crate::repl::{Repl, ReplContext};
use crate::session::FileSessionStore;

#[derive(Parser, Debug)]
#[command(
    name = "agent-cli",
    about = "Interactive CLI agent with streaming output and approval-gated tools",
    version
)]
struct Args {
    /// Optional initial message to send to the agent
    prompt: Vec<String>,

    /// Backend: ollama, openai, or mistral
    #[arg(long, default_value = "ollama")]
    provider: String,

    /// Model name
    #[arg(long, default_value = "qwen3:14b")]
    model: String,

    /// Base URL override for the provider
    #[arg(long)]
    endpoint: Option<String>,

    /// API key for hosted providers (falls back to OPENAI_API_KEY or
    /// MISTRAL_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Timeout for the run_shell tool, in seconds
    #[arg(long, default_value_t = 60)]
    shell_timeout: u64,

    /// Wall-clock budget for any single tool call, in seconds
    #[arg(long, default_value_t = 60)]
    tool_timeout: u64,

    /// Idle timeout for provider streams, in seconds
    #[arg(long, default_value_t = 120)]
    request_timeout: u64,

    /// Maximum tool round-trips per turn
    #[arg(long, default_value_t = 10)]
    max_tool_rounds: usize,

    /// Character cap for tool output fed back to the model
    #[arg(long, default_value_t = 4000)]
    truncation_limit: usize,

    /// Directory for saved sessions (default: ./sessions)
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// File containing a system prompt template ({{tools}} placeholder)
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();
    let log = logging::init();

    let kind: ProviderKind = args.provider.parse()?;
    let api_key = args.api_key.clone().or_else(|| match kind {
        ProviderKind::OpenAi => std::env::var("OPENAI_API_KEY").ok(),
        ProviderKind::Mistral => std::env::var("MISTRAL_API_KEY").ok(),
        ProviderKind::Ollama => None,
    });
    let provider = create_provider(&ProviderSettings {
        kind,
        endpoint: args.endpoint.clone(),
        api_key,
        timeout_secs: args.request_timeout,
    })?;

    match provider.health_check().await {
        Ok(true) => tracing::info!(provider = %kind, "provider reachable"),
        _ => tracing::warn!(
            provider = %kind,
            "provider not reachable - requests will fail until it is"
        ),
    }

    let registry = tools::build_tools(
        Duration::from_secs(args.shell_timeout),
        tools::SearchConfig::from_env(),
    );
    tracing::info!(tools = ?registry.names(), "registered tools");

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agent-cli");
    let approvals = Arc::new(FileApprovalStore::new(config_dir.join("allowed_tools")));
    let dispatcher = ToolDispatcher::new(Arc::new(registry), approvals, Arc::new(ConsolePrompt))
        .with_config(DispatchConfig {
            tool_timeout: Duration::from_secs(args.tool_timeout),
            truncation_limit: args.truncation_limit,
        });

    let system_prompt_template = match &args.system_prompt {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };
    let agent_config = AgentConfig {
        system_prompt_template,
        max_tool_rounds: args.max_tool_rounds,
        generation: GenerationOptions {
            model: args.model.clone(),
            temperature: args.temperature,
            ..GenerationOptions::default()
        },
        ..AgentConfig::default()
    };
    let agent = Agent::new(provider, dispatcher, agent_config);

    let session_dir = args
        .session_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("sessions"));
    let use_color = !args.no_color && console::user_attended();

    let ctx = ReplContext {
        agent,
        conversation: Conversation::new(),
        sessions: FileSessionStore::new(session_dir),
        use_color,
        log,
    };

    let initial_message = (!args.prompt.is_empty()).then(|| args.prompt.join(" "));
    Repl::new(ctx).run(initial_message).await
}
