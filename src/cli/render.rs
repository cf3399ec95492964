// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Terminal rendering of an agent loop run

use std::io::{self, Write};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use crate::chat::{AgentLoopObserver, ExitReason, LoopOutcome, LoopState};
use crate::error::Result;
use crate::llm::Usage;
use crate::tools::{ToolInvocation, ToolName, ToolResult, ToolStatus};

/// Maximum lines of command output shown under a bash or git result
pub const SHELL_OUTPUT_MAX_LINES: usize = 12;

/// Observer printing content to stdout and everything else to stderr
#[derive(Debug, Default)]
pub struct TerminalObserver {
    mid_line: bool,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

impl AgentLoopObserver for TerminalObserver {
    fn on_state(&mut self, state: LoopState) -> Result<()> {
        if let LoopState::Dispatching(_) = state {
            self.end_line();
        }
        Ok(())
    }

    fn on_content(&mut self, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        print!("{}", text);
        stdout.flush()?;
        self.mid_line = !text.ends_with('\n');
        Ok(())
    }

    fn on_reasoning(&mut self, text: &str) -> Result<()> {
        let mut stderr = io::stderr();
        stderr.execute(SetForegroundColor(Color::DarkGrey))?;
        eprint!("{}", text);
        stderr.execute(ResetColor)?;
        Ok(())
    }

    fn on_usage(&mut self, usage: &Usage) -> Result<()> {
        tracing::debug!(
            input = ?usage.input_tokens,
            output = ?usage.output_tokens,
            "Usage report"
        );
        Ok(())
    }

    fn on_tool_invocation(&mut self, invocation: &ToolInvocation) -> Result<()> {
        print_tool_invocation(invocation)
    }

    fn on_tool_result(&mut self, result: &ToolResult) -> Result<()> {
        print_tool_result(result)
    }

    fn on_exit(&mut self, outcome: &LoopOutcome) -> Result<()> {
        self.end_line();
        let mut stderr = io::stderr();
        if outcome.reason != ExitReason::Completed {
            stderr.execute(SetForegroundColor(Color::Yellow))?;
            eprintln!("Stopped: {}", exit_message(outcome.reason));
            stderr.execute(ResetColor)?;
        }
        stderr.execute(SetForegroundColor(Color::DarkGrey))?;
        eprintln!(
            "{} turn(s), {} tokens",
            outcome.turns,
            outcome.usage.total()
        );
        stderr.execute(ResetColor)?;
        Ok(())
    }
}

fn exit_message(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::Completed => "completed",
        ExitReason::MaxTurns => "turn limit reached",
        ExitReason::RepeatedToolCalls => "the model repeated the same tool calls",
        ExitReason::ConsecutiveFailures => "too many failed tool rounds in a row",
        ExitReason::Cancelled => "cancelled",
    }
}

fn tool_color(tool: &ToolName) -> Color {
    match tool {
        ToolName::Read | ToolName::Grep | ToolName::Glob | ToolName::Ls => Color::Blue,
        ToolName::Write => Color::Green,
        ToolName::Edit => Color::Yellow,
        ToolName::Delete => Color::Red,
        _ => Color::Cyan,
    }
}

/// Print the header line for a tool call
pub fn print_tool_invocation(invocation: &ToolInvocation) -> Result<()> {
    let mut stdout = io::stdout();
    let tool = invocation.tool();

    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!("  ╭─ ");
    stdout.execute(SetForegroundColor(Color::Magenta))?;
    print!("{}", tool);
    stdout.execute(ResetColor)?;

    let arg = invocation.request.primary_arg().trim();
    if arg.is_empty() {
        println!();
    } else {
        stdout.execute(SetForegroundColor(Color::DarkGrey))?;
        print!(" → ");
        stdout.execute(SetForegroundColor(tool_color(&tool)))?;
        println!("{}", first_line(arg));
        stdout.execute(ResetColor)?;
    }
    Ok(())
}

/// Print the closing line for a tool call, with output excerpt for commands
pub fn print_tool_result(result: &ToolResult) -> Result<()> {
    let mut stdout = io::stdout();

    if result.command.is_some() {
        for line in output_excerpt(&result.result, SHELL_OUTPUT_MAX_LINES) {
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            print!("  │ ");
            stdout.execute(ResetColor)?;
            println!("{}", line);
        }
    }

    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!("  ╰─ ");
    match result.status {
        ToolStatus::Success => {
            stdout.execute(SetForegroundColor(Color::Green))?;
            print!("✓");
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            match result.lines_changed {
                Some(lines) => println!(" {} line(s) changed", lines),
                None => println!(),
            }
        }
        ToolStatus::Failed => {
            stdout.execute(SetForegroundColor(Color::Red))?;
            println!("✗ {}", first_line(&result.result));
        }
        ToolStatus::Denied => {
            stdout.execute(SetForegroundColor(Color::Yellow))?;
            println!("denied");
        }
    }
    stdout.execute(ResetColor)?;
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// The first `max_lines` lines of `output`, plus a count of what was hidden
pub fn output_excerpt(output: &str, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = output.lines().collect();
    let mut excerpt: Vec<String> = lines.iter().take(max_lines).map(|l| l.to_string()).collect();
    if lines.len() > max_lines {
        excerpt.push(format!("... ({} more lines)", lines.len() - max_lines));
    }
    excerpt
}
