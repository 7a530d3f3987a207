//! Slash-command registry for the REPL.
//!
//! Commands operate on the REPL context and never touch a turn in
//! progress; the orchestrator only meets them through the context they
//! share.

use std::collections::BTreeMap;

use async_trait::async_trait;

use agent_core::session::{Session, SessionId, SessionStore};
use agent_core::tool::{Tool, ToolCall};

use crate::repl::ReplContext;
use crate::session::sanitize_session_name;

pub const COMMAND_PREFIX: char = '/';

/// What the REPL should do after a command ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn usage(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome;
}

/// Name → command mapping with `/name arg...` dispatch
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    /// Commands in name order
    pub fn list(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|command| command.as_ref())
    }

    pub async fn dispatch(&self, raw: &str, ctx: &mut ReplContext) -> CommandOutcome {
        let stripped = raw.strip_prefix(COMMAND_PREFIX).unwrap_or(raw);
        if stripped.is_empty() {
            println!("Unknown command - see /help");
            return CommandOutcome::Continue;
        }
        let (name, argument) = match stripped.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (stripped, ""),
        };
        let name = name.to_lowercase();
        match self.commands.get(name.as_str()) {
            Some(command) => command.execute(ctx, self, argument).await,
            None => {
                println!("Unknown command - see /help");
                CommandOutcome::Continue
            }
        }
    }
}

/// Registry with every built-in command
pub fn build_default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Box::new(HelpCommand));
    registry.register(Box::new(InfoCommand));
    registry.register(Box::new(ListCommand));
    registry.register(Box::new(SaveCommand));
    registry.register(Box::new(LoadCommand));
    registry.register(Box::new(RemoveCommand));
    registry.register(Box::new(TailCommand));
    registry.register(Box::new(TruncateCommand));
    registry.register(Box::new(DebugCommand));
    registry.register(Box::new(DebugToolCommand));
    registry.register(Box::new(ContextDumpCommand));
    registry.register(Box::new(SloMoCommand));
    registry.register(Box::new(ExitCommand));
    registry
}

fn resolve_session_name(argument: &str, usage: &str) -> Option<String> {
    if argument.trim().is_empty() {
        println!("Usage: {usage}");
        return None;
    }
    match sanitize_session_name(argument) {
        Some(name) => Some(name),
        None => {
            println!("Invalid session name. Use letters, numbers, hyphen, or underscore.");
            None
        }
    }
}

// ============================================================================
// Built-in commands
// ============================================================================

struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }
    fn description(&self) -> &'static str {
        "Show available commands"
    }
    fn usage(&self) -> &'static str {
        "/help"
    }

    async fn execute(
        &self,
        _ctx: &mut ReplContext,
        registry: &CommandRegistry,
        _argument: &str,
    ) -> CommandOutcome {
        println!("Available commands:");
        for command in registry.list() {
            println!("  {:<24} {}", command.usage(), command.description());
        }
        CommandOutcome::Continue
    }
}

struct InfoCommand;

#[async_trait]
impl Command for InfoCommand {
    fn name(&self) -> &'static str {
        "info"
    }
    fn description(&self) -> &'static str {
        "Display model and session statistics"
    }
    fn usage(&self) -> &'static str {
        "/info"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        _argument: &str,
    ) -> CommandOutcome {
        println!("Provider: {}", ctx.agent.provider_info().name);
        println!("Model: {}", ctx.agent.config().generation.model);
        println!("Messages in session: {}", ctx.conversation.len());

        let totals = ctx.conversation.usage_totals();
        if totals.is_zero() {
            println!("Approximate tokens: {}", ctx.conversation.word_count());
        } else {
            println!("Prompt tokens: {}", totals.prompt_tokens);
            println!("Completion tokens: {}", totals.completion_tokens);
            println!("Total tokens: {}", totals.total_tokens);
        }

        if ctx.conversation.truncation_enabled() {
            println!(
                "Truncation: on (limit: {} chars)",
                ctx.agent.dispatcher().config().truncation_limit
            );
        } else {
            println!("Truncation: off");
        }
        println!(
            "Debug logging: {}",
            if ctx.log.debug_enabled() { "on" } else { "off" }
        );
        CommandOutcome::Continue
    }
}

struct ListCommand;

#[async_trait]
impl Command for ListCommand {
    fn name(&self) -> &'static str {
        "ls"
    }
    fn description(&self) -> &'static str {
        "List saved sessions"
    }
    fn usage(&self) -> &'static str {
        "/ls"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        _argument: &str,
    ) -> CommandOutcome {
        match ctx.sessions.list() {
            Ok(summaries) if summaries.is_empty() => println!("No saved sessions found."),
            Ok(summaries) => {
                println!("Saved sessions in {}:", ctx.sessions.dir().display());
                for summary in summaries {
                    println!("  {}.json  ({} bytes)", summary.id, summary.size_bytes);
                }
            }
            Err(err) => println!("Failed to list sessions: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct SaveCommand;

#[async_trait]
impl Command for SaveCommand {
    fn name(&self) -> &'static str {
        "save"
    }
    fn description(&self) -> &'static str {
        "Save the conversation under a name"
    }
    fn usage(&self) -> &'static str {
        "/save <name>"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let Some(name) = resolve_session_name(argument, self.usage()) else {
            return CommandOutcome::Continue;
        };
        let session = Session::from_conversation(
            SessionId::from_string(&name),
            ctx.conversation.clone(),
        );
        match ctx.sessions.save(&session) {
            Ok(()) => println!(
                "Session saved to {}",
                ctx.sessions.dir().join(format!("{name}.json")).display()
            ),
            Err(err) => println!("Failed to save session: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct LoadCommand;

#[async_trait]
impl Command for LoadCommand {
    fn name(&self) -> &'static str {
        "load"
    }
    fn description(&self) -> &'static str {
        "Replace the conversation with a saved session"
    }
    fn usage(&self) -> &'static str {
        "/load <name>"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let Some(name) = resolve_session_name(argument, self.usage()) else {
            return CommandOutcome::Continue;
        };
        match ctx.sessions.load(&SessionId::from_string(&name)) {
            Ok(Some(session)) => {
                ctx.conversation = session.conversation;
                // the active system prompt wins over whatever was saved
                let prompt = ctx.agent.build_system_prompt();
                ctx.conversation.set_system_prompt(prompt);
                println!(
                    "Session '{name}' loaded. Conversation length: {} messages.",
                    ctx.conversation.len()
                );
            }
            Ok(None) => println!("Session '{name}' not found."),
            Err(err) => println!("Failed to load session: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct RemoveCommand;

#[async_trait]
impl Command for RemoveCommand {
    fn name(&self) -> &'static str {
        "rm"
    }
    fn description(&self) -> &'static str {
        "Remove a saved session"
    }
    fn usage(&self) -> &'static str {
        "/rm <name>"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let Some(name) = resolve_session_name(argument, self.usage()) else {
            return CommandOutcome::Continue;
        };
        match ctx.sessions.delete(&SessionId::from_string(&name)) {
            Ok(()) => println!("Removed session '{name}'."),
            Err(err) => println!("Failed to remove session: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct TailCommand;

#[async_trait]
impl Command for TailCommand {
    fn name(&self) -> &'static str {
        "tail"
    }
    fn description(&self) -> &'static str {
        "Show the last N conversation messages"
    }
    fn usage(&self) -> &'static str {
        "/tail [N]"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let count = if argument.is_empty() {
            5
        } else {
            match argument.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    println!("Usage: {}", self.usage());
                    return CommandOutcome::Continue;
                }
            }
        };

        let tail = ctx.conversation.tail(count);
        if tail.is_empty() {
            println!("Conversation is empty.");
            return CommandOutcome::Continue;
        }
        for message in tail {
            let role = message.role.to_string().to_uppercase();
            println!("[{role}] {}", message.content);
        }
        CommandOutcome::Continue
    }
}

struct TruncateCommand;

#[async_trait]
impl Command for TruncateCommand {
    fn name(&self) -> &'static str {
        "truncate"
    }
    fn description(&self) -> &'static str {
        "Enable or disable tool output truncation"
    }
    fn usage(&self) -> &'static str {
        "/truncate on|off"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        match argument.to_lowercase().as_str() {
            "on" => {
                ctx.conversation.set_truncation(true);
                println!("Tool output truncation enabled.");
            }
            "off" => {
                ctx.conversation.set_truncation(false);
                println!("Tool output truncation disabled.");
            }
            _ => println!("Usage: {}", self.usage()),
        }
        CommandOutcome::Continue
    }
}

struct DebugCommand;

#[async_trait]
impl Command for DebugCommand {
    fn name(&self) -> &'static str {
        "debug"
    }
    fn description(&self) -> &'static str {
        "Toggle debug logging"
    }
    fn usage(&self) -> &'static str {
        "/debug [on|off]"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        match argument.to_lowercase().as_str() {
            "" => println!(
                "Debug logging is {}.",
                if ctx.log.debug_enabled() { "on" } else { "off" }
            ),
            "on" => {
                ctx.log.set_debug(true);
                println!("Debug logging enabled.");
            }
            "off" => {
                ctx.log.set_debug(false);
                println!("Debug logging disabled.");
            }
            _ => println!("Usage: {}", self.usage()),
        }
        CommandOutcome::Continue
    }
}

struct DebugToolCommand;

#[async_trait]
impl Command for DebugToolCommand {
    fn name(&self) -> &'static str {
        "debug_tool"
    }
    fn description(&self) -> &'static str {
        "Invoke a tool directly, bypassing the model"
    }
    fn usage(&self) -> &'static str {
        "/debug_tool <name> <json>"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let (name, raw_args) = match argument.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (argument, ""),
        };
        if name.is_empty() {
            println!("Usage: {}", self.usage());
            return CommandOutcome::Continue;
        }

        let call = ToolCall::new(
            name,
            if raw_args.is_empty() { "{}" } else { raw_args },
        );
        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(err) => {
                println!("{err}. Example: {{\"query\": \"example\"}}");
                return CommandOutcome::Continue;
            }
        };

        let Some(tool) = ctx.agent.dispatcher().registry().get(name) else {
            println!("Unknown tool '{name}'.");
            return CommandOutcome::Continue;
        };

        println!("[tool {name}]");
        match tool.execute(&args).await {
            Ok(output) => println!("{output}"),
            Err(err) => println!("ERROR: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct ContextDumpCommand;

#[async_trait]
impl Command for ContextDumpCommand {
    fn name(&self) -> &'static str {
        "context_dump"
    }
    fn description(&self) -> &'static str {
        "Print or write the raw conversation as JSON"
    }
    fn usage(&self) -> &'static str {
        "/context_dump [path]"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        let snapshot = ctx.conversation.snapshot();
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => json,
            Err(err) => {
                println!("Failed to serialize conversation: {err}");
                return CommandOutcome::Continue;
            }
        };

        if argument.is_empty() {
            println!("{json}");
            return CommandOutcome::Continue;
        }

        let path = std::path::PathBuf::from(argument);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    println!("Failed to write context dump: {err}");
                    return CommandOutcome::Continue;
                }
            }
        }
        match std::fs::write(&path, json) {
            Ok(()) => println!("Context dumped to {}", path.display()),
            Err(err) => println!("Failed to write context dump: {err}"),
        }
        CommandOutcome::Continue
    }
}

struct SloMoCommand;

#[async_trait]
impl Command for SloMoCommand {
    fn name(&self) -> &'static str {
        "slomo"
    }
    fn description(&self) -> &'static str {
        "Set or display delay between model calls"
    }
    fn usage(&self) -> &'static str {
        "/slomo [seconds]"
    }

    async fn execute(
        &self,
        ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        argument: &str,
    ) -> CommandOutcome {
        if argument.is_empty() {
            let delay = ctx.agent.config().inter_round_delay;
            if delay.is_zero() {
                println!("SloMo is disabled.");
            } else {
                println!(
                    "SloMo delay is {} seconds between model calls.",
                    delay.as_secs_f64()
                );
            }
            return CommandOutcome::Continue;
        }

        match argument.parse::<f64>() {
            Ok(seconds) if seconds >= 0.0 => {
                ctx.agent.config_mut().inter_round_delay =
                    std::time::Duration::from_secs_f64(seconds);
                if seconds > 0.0 {
                    println!("SloMo delay set to {seconds} seconds between model calls.");
                } else {
                    println!("SloMo disabled.");
                }
            }
            _ => println!("Usage: {}", self.usage()),
        }
        CommandOutcome::Continue
    }
}

struct ExitCommand;

#[async_trait]
impl Command for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }
    fn description(&self) -> &'static str {
        "Leave the agent"
    }
    fn usage(&self) -> &'static str {
        "/exit"
    }

    async fn execute(
        &self,
        _ctx: &mut ReplContext,
        _registry: &CommandRegistry,
        _argument: &str,
    ) -> CommandOutcome {
        CommandOutcome::Exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_commands_in_name_order() {
        let registry = build_default_registry();
        let names: Vec<&str> = registry.list().map(|command| command.name()).collect();

        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"help"));
        assert!(names.contains(&"debug_tool"));
    }

    #[test]
    fn test_usage_strings_carry_the_prefix() {
        for command in build_default_registry().list() {
            assert!(command.usage().starts_with(COMMAND_PREFIX));
        }
    }
}
