//! Terminal rendering for streamed turns.
//!
//! Reasoning-channel text is dimmed, answer text is printed as-is, and
//! tool activity gets bracketed log lines, all in arrival order.

use std::io::Write;

use console::style;

use agent_core::agent::TurnSink;
use agent_core::reasoning::Channel;
use agent_core::tool::{ToolCall, ToolResult};

/// Sink that renders a turn to stdout
pub struct TerminalSink {
    use_color: bool,
}

impl TerminalSink {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }
}

impl TurnSink for TerminalSink {
    fn on_text(&mut self, channel: Channel, text: &str) {
        if self.use_color && channel == Channel::Reasoning {
            print!("{}", style(text).dim());
        } else {
            print!("{text}");
        }
        let _ = std::io::stdout().flush();
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        println!("\n[tool call] {} {}", call.name, call.raw_arguments.trim());
    }

    fn on_tool_result(&mut self, result: &ToolResult) {
        if result.success {
            println!("[tool result]\n{}\n", result.output);
        } else {
            println!("[tool failed]\n{}\n", result.output);
        }
    }
}

/// Styled prompt label for user input
pub fn user_label(use_color: bool) -> String {
    if use_color {
        format!("{} ", style("you>").yellow())
    } else {
        "you> ".into()
    }
}

/// Styled label printed before the agent's streamed reply
pub fn agent_label(use_color: bool) -> String {
    if use_color {
        format!("{} ", style("agent>").cyan())
    } else {
        "agent> ".into()
    }
}
