// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shell command execution tool
//!
//! Executes shell commands with timeout and safety checks. The process
//! helpers here are shared with the git tool and fenced-script execution.

use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::{truncate_output, ScriptLanguage, ToolContext};

const MAX_STDOUT_BYTES: usize = 30_000;
const MAX_STDERR_BYTES: usize = 10_000;

/// Substrings that are always refused
const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /*",
    ":(){:|:&};:",
    ":(){ :|:& };:",
    "> /dev/sda",
    "dd if=/dev/zero of=/dev",
    "dd if=/dev/random of=/dev",
    "chmod -r 777 /",
    "init 0",
    "init 6",
];

/// Command words that are always refused
const BLOCKED_COMMANDS: &[&str] = &["sudo", "shutdown", "reboot", "poweroff", "halt"];

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "bash",
        "Execute a shell command in the working directory and return its exit code, stdout and stderr. Commands run with a timeout.",
        SchemaBuilder::new()
            .string("command", "The shell command to execute", true)
            .build(),
    )
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Text fed back to the model
    pub fn render(&self) -> String {
        let mut text = format!("Exit code: {}\n", self.exit_code);
        if !self.stdout.is_empty() {
            text.push_str("\n--- stdout ---\n");
            text.push_str(&truncate_output(&self.stdout, MAX_STDOUT_BYTES));
        }
        if !self.stderr.is_empty() {
            text.push_str("\n--- stderr ---\n");
            text.push_str(&truncate_output(&self.stderr, MAX_STDERR_BYTES));
        }
        text
    }
}

/// Check if a command is blocked
pub fn is_blocked(command: &str) -> bool {
    let lower = command.to_lowercase();
    if BLOCKED_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }

    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')'))
        .filter(|w| !w.is_empty())
        .collect();
    if words
        .iter()
        .any(|w| BLOCKED_COMMANDS.contains(w) || w.starts_with("mkfs"))
    {
        return true;
    }

    is_dangerous_rm_root(&words)
}

/// `rm` with a recursive flag aimed at `/` or `/*`
fn is_dangerous_rm_root(words: &[&str]) -> bool {
    let mut i = 0;
    while i < words.len() {
        if words[i] != "rm" {
            i += 1;
            continue;
        }

        let mut recursive = false;
        let mut root_target = false;
        let mut j = i + 1;
        while j < words.len() && words[j] != "rm" {
            let token = words[j].trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '`');
            if let Some(flags) = token.strip_prefix('-') {
                if token == "--recursive" || (!token.starts_with("--") && flags.contains('r')) {
                    recursive = true;
                }
            } else if token == "/" || token == "/*" {
                root_target = true;
            }
            j += 1;
        }

        if recursive && root_target {
            return true;
        }
        i = j;
    }
    false
}

/// Run a prepared command in the working directory with the context timeout.
///
/// `Err` means the process could not run to completion (spawn failure or
/// timeout); a non-zero exit is an `Ok` output.
pub(crate) async fn run_command(
    mut command: Command,
    context: &ToolContext,
) -> Result<CommandOutput, String> {
    command
        .current_dir(&context.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| format!("Failed to spawn command: {}", e))?;

    match timeout(context.shell_timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(format!("Failed to execute command: {}", e)),
        // Dropping the wait future drops the child, which kills it
        Err(_) => Err(format!(
            "Command timed out after {:?}",
            context.shell_timeout
        )),
    }
}

/// Execute `command` through `sh -c`
pub async fn execute(context: &ToolContext, command: &str) -> Result<CommandOutput, String> {
    if command.trim().is_empty() {
        return Err("command is required".to_string());
    }
    if is_blocked(command) {
        tracing::warn!(target: "quill.tools", command, "Blocked shell command");
        return Err(format!(
            "Command blocked for safety reasons: {}",
            command.trim()
        ));
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    run_command(cmd, context).await
}

/// Execute a script body with the language's interpreter
pub async fn execute_script(
    context: &ToolContext,
    language: ScriptLanguage,
    code: &str,
) -> Result<CommandOutput, String> {
    let mut cmd = Command::new(language.interpreter());
    cmd.arg("-c").arg(code);
    run_command(cmd, context).await
}
