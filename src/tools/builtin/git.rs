// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Git tool
//!
//! Runs `git` directly with the given arguments, without a shell in between.

use tokio::process::Command;

use super::shell::{run_command, CommandOutput};
use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

/// Subcommands that rewrite history or talk to remotes
const REFUSED_SUBCOMMANDS: &[&str] = &["push", "filter-branch", "gc", "prune"];

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "git",
        "Run a git command in the working directory (e.g. 'status', 'diff --stat', 'log -n 5'). Pass only the arguments after 'git'.",
        SchemaBuilder::new()
            .string("args", "Arguments to pass to git", true)
            .build(),
    )
}

/// Split an argument string on whitespace, honouring single and double quotes.
pub fn split_args(input: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => return Err("trailing backslash in git arguments".to_string()),
            },
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_arg = true;
                }
                c if c.is_whitespace() => {
                    if in_arg {
                        args.push(std::mem::take(&mut current));
                        in_arg = false;
                    }
                }
                c => {
                    current.push(c);
                    in_arg = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err("unterminated quote in git arguments".to_string());
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

/// Global options that take their value as the next argument
const GLOBAL_OPTIONS_WITH_VALUE: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--config-env",
    "--super-prefix",
];

/// The subcommand `git` would run, skipping the global options before it.
///
/// Returns `None` when only options were given (`--version`, `--help`).
pub fn subcommand(argv: &[String]) -> Option<&str> {
    let mut args = argv.iter();
    while let Some(arg) = args.next() {
        if GLOBAL_OPTIONS_WITH_VALUE.contains(&arg.as_str()) {
            args.next()?;
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

/// Whether `-c`/`--config-env` defines an alias, which could stand in for a
/// refused subcommand.
fn defines_alias(argv: &[String]) -> bool {
    argv.windows(2).any(|pair| {
        matches!(pair[0].as_str(), "-c" | "--config-env")
            && pair[1].to_ascii_lowercase().starts_with("alias.")
    }) || argv
        .iter()
        .any(|arg| arg.to_ascii_lowercase().starts_with("--config-env=alias."))
}

pub async fn execute(context: &ToolContext, args: &str) -> Result<CommandOutput, String> {
    let trimmed = args.trim();
    let trimmed = trimmed.strip_prefix("git ").unwrap_or(trimmed);
    let argv = split_args(trimmed)?;
    if argv.is_empty() {
        return Err("git arguments are required".to_string());
    }
    if let Some(subcommand) = subcommand(&argv) {
        if REFUSED_SUBCOMMANDS.contains(&subcommand) {
            tracing::warn!(target: "quill.tools", subcommand = %subcommand, "Refused git subcommand");
            return Err(format!("git {} is not allowed from the agent", subcommand));
        }
    }
    if defines_alias(&argv) {
        tracing::warn!(target: "quill.tools", "Refused inline git alias");
        return Err("defining git aliases on the command line is not allowed".to_string());
    }

    let mut command = Command::new("git");
    command.args(&argv).env("GIT_TERMINAL_PROMPT", "0");
    run_command(command, context).await
}
