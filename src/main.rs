// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Quill - coding agent for your terminal
//!
//! Entry point for the Quill CLI application.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quill::chat::agent::system_prompt;
use quill::chat::{AgentLoopConfig, AgentRunner, ExitReason};
use quill::cli::{Cli, TerminalObserver};
use quill::config::Settings;
use quill::error::{QuillError, Result};
use quill::llm::message::{Conversation, Message};
use quill::llm::StreamingClient;
use quill::tools::changes::shared_ledger;
use quill::tools::permission::{PermissionGate, PermissionModeHandle, StdinApprover};
use quill::tools::{ToolContext, ToolExecutor};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let mut env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if cli.verbose > 0 {
        // "quill" prefixes both the module path and the dotted targets
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        if let Ok(directive) = format!("quill={}", level).parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(reason) => {
            let code = match reason {
                ExitReason::Completed => 0,
                ExitReason::Cancelled => 130,
                _ => 2,
            };
            std::process::exit(code);
        }
        Err(e) => {
            let mut stderr = std::io::stderr();
            let _ = stderr.execute(SetForegroundColor(Color::Red));
            eprint!("Error: ");
            let _ = stderr.execute(ResetColor);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<ExitReason> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    let working_directory = match &cli.directory {
        Some(dir) => dir.canonicalize().map_err(|e| {
            QuillError::InvalidInput(format!("Working directory {}: {}", dir.display(), e))
        })?,
        None => std::env::current_dir()?,
    };

    let client_config = settings.resolve_client(cli.provider.as_deref(), cli.model.as_deref())?;
    tracing::info!(
        provider = %client_config.provider,
        model = %client_config.model,
        "Starting session"
    );
    let client = StreamingClient::new(client_config)?;

    let mode = cli.mode.unwrap_or(settings.permissions.mode);
    let gate = PermissionGate::new(PermissionModeHandle::new(mode), Arc::new(StdinApprover::new()));
    let context = ToolContext::new(working_directory.clone())
        .with_shell_timeout(Duration::from_secs(settings.agent.shell_timeout_secs));
    let executor = ToolExecutor::new(context, shared_ledger(settings.agent.undo_capacity), gate);

    let mut config = AgentLoopConfig::from(&settings.agent);
    if let Some(max_turns) = cli.max_turns {
        config.max_turns = max_turns.max(1);
    }
    let mut runner = AgentRunner::new(Arc::new(client), executor).with_config(config);

    let mut conversation = Conversation::with_system(system_prompt(&working_directory));
    conversation.push(Message::user(cli.prompt_text()));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let mut observer = TerminalObserver::new();
    let outcome = runner.run(&mut conversation, cancel, &mut observer).await?;

    let stats = runner.executor().stats().snapshot();
    tracing::info!(
        calls = stats.calls,
        failures = stats.failures,
        denials = stats.denials,
        "Session finished"
    );
    Ok(outcome.reason)
}
