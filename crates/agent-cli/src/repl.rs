//! Interactive REPL loop.
//!
//! Reads user input, routes slash commands, and drives one orchestrator
//! turn per message. Ctrl-C during a turn requests cancellation and the
//! turn winds down at the next event boundary; Ctrl-C at the prompt
//! exits.

use std::io::Write;
use std::pin::pin;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use agent_core::agent::{Agent, CancelToken};
use agent_core::message::{Conversation, Message};

use crate::commands::{CommandOutcome, CommandRegistry, build_default_registry};
use crate::display::{TerminalSink, agent_label, user_label};
use crate::logging::LogControl;
use crate::session::FileSessionStore;

/// Everything the REPL and its commands operate on
pub struct ReplContext {
    pub agent: Agent,
    pub conversation: Conversation,
    pub sessions: FileSessionStore,
    pub use_color: bool,
    pub log: LogControl,
}

/// The interactive loop
pub struct Repl {
    registry: CommandRegistry,
    ctx: ReplContext,
}

impl Repl {
    pub fn new(ctx: ReplContext) -> Self {
        Self {
            registry: build_default_registry(),
            ctx,
        }
    }

    pub async fn run(&mut self, initial_message: Option<String>) -> anyhow::Result<()> {
        let mut editor = DefaultEditor::new()?;

        if let Some(message) = initial_message {
            self.ctx.conversation.push(Message::user(message));
            self.run_turn().await;
        }

        loop {
            match editor.readline(&user_label(self.ctx.use_color)) {
                Ok(line) => {
                    let trimmed = line.trim().to_string();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(&trimmed);

                    if trimmed.starts_with('/') {
                        let outcome = self.registry.dispatch(&trimmed, &mut self.ctx).await;
                        if outcome == CommandOutcome::Exit {
                            println!("Bye.");
                            return Ok(());
                        }
                        continue;
                    }
                    if matches!(trimmed.to_lowercase().as_str(), "exit" | "quit") {
                        println!("Bye.");
                        return Ok(());
                    }

                    self.ctx.conversation.push(Message::user(trimmed));
                    self.run_turn().await;
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    println!("\nExiting.");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn run_turn(&mut self) {
        print!("{}", agent_label(self.ctx.use_color));
        let _ = std::io::stdout().flush();

        let cancel = CancelToken::new();
        let mut sink = TerminalSink::new(self.ctx.use_color);

        let ctx = &mut self.ctx;
        let mut turn = pin!(ctx.agent.run_turn(&mut ctx.conversation, &mut sink, &cancel));
        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    cancel.cancel();
                    eprintln!("\n[interrupt] stopping after the current step...");
                }
            }
        };

        match result {
            Ok(report) if report.cancelled => {
                println!("\n[interrupted] turn abandoned; conversation preserved");
            }
            Ok(report) => {
                println!();
                tracing::debug!(rounds = report.tool_rounds, "turn finished");
            }
            Err(err) => {
                println!("\n[error] {}", err.user_message());
            }
        }
    }
}
