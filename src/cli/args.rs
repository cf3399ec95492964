// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::Parser;
use std::path::PathBuf;

use crate::tools::PermissionMode;

/// Quill - coding agent for your terminal
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version, about = "Coding agent for your terminal")]
pub struct Cli {
    /// Task for the agent
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Provider entry from the settings file (openai, anthropic, gemini, ollama, ...)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Permission mode (auto, ask, strict, bypass, acceptEdits, plan, dontAsk, delegate)
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<PermissionMode>,

    /// Maximum streaming rounds
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Working directory (defaults to current)
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Settings file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The prompt words joined back into one message
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

fn parse_mode(value: &str) -> Result<PermissionMode, String> {
    value.parse().map_err(|e: crate::error::QuillError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["quill", "fix", "the", "tests"]).unwrap();
        assert_eq!(cli.prompt_text(), "fix the tests");
        assert!(cli.provider.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_all_flags() {
        let cli = Cli::try_parse_from([
            "quill",
            "--provider",
            "anthropic",
            "-m",
            "claude-sonnet-4-20250514",
            "--mode",
            "accept-edits",
            "--max-turns",
            "5",
            "-vv",
            "hello",
        ])
        .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("anthropic"));
        assert_eq!(cli.mode, Some(PermissionMode::AcceptEdits));
        assert_eq!(cli.max_turns, Some(5));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_prompt_required() {
        assert!(Cli::try_parse_from(["quill"]).is_err());
    }

    #[test]
    fn test_bad_mode_rejected() {
        assert!(Cli::try_parse_from(["quill", "--mode", "yolo", "x"]).is_err());
    }
}
