// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Permission system for tools
//!
//! The gate maps a tool's [`RiskClass`] and the active [`PermissionMode`] to
//! allow, ask or deny. "Ask" is resolved by an injected [`Approver`], so the
//! gate itself never touches the terminal.

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::QuillError;
use crate::tools::{RiskClass, ToolName, ToolRequest};

/// How the gate treats tool calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Never ask
    Auto,
    /// Ask for moderate and dangerous tools
    #[default]
    Ask,
    /// Ask for everything
    Strict,
    /// Never ask (alias of auto kept for settings compatibility)
    Bypass,
    /// File edits allowed, shell commands asked
    AcceptEdits,
    /// Read-only planning; mutations and commands are refused
    Plan,
    /// Whatever would need asking is refused instead
    DontAsk,
    /// Like ask, with the decision made by a delegate approver
    Delegate,
}

/// Gate verdict before any approver is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Ask,
    Deny,
}

impl PermissionMode {
    const ALL: [PermissionMode; 8] = [
        PermissionMode::Auto,
        PermissionMode::Ask,
        PermissionMode::Strict,
        PermissionMode::Bypass,
        PermissionMode::AcceptEdits,
        PermissionMode::Plan,
        PermissionMode::DontAsk,
        PermissionMode::Delegate,
    ];

    pub fn decide(&self, risk: RiskClass) -> PermissionDecision {
        use PermissionDecision::*;

        match (self, risk) {
            (PermissionMode::Auto | PermissionMode::Bypass, _) => Allow,
            (PermissionMode::Strict, _) => Ask,
            (_, RiskClass::Safe) => Allow,
            (PermissionMode::AcceptEdits, RiskClass::Moderate) => Allow,
            (PermissionMode::Plan | PermissionMode::DontAsk, _) => Deny,
            _ => Ask,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Auto => "auto",
            PermissionMode::Ask => "ask",
            PermissionMode::Strict => "strict",
            PermissionMode::Bypass => "bypass",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::DontAsk => "dontAsk",
            PermissionMode::Delegate => "delegate",
        }
    }

    fn to_u8(self) -> u8 {
        Self::ALL.iter().position(|m| *m == self).unwrap_or(1) as u8
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(PermissionMode::Ask)
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| QuillError::InvalidInput(format!("Unknown permission mode '{}'", s)))
    }
}

/// Shared, switchable permission mode
#[derive(Debug, Clone)]
pub struct PermissionModeHandle {
    mode: Arc<AtomicU8>,
}

impl PermissionModeHandle {
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.to_u8())),
        }
    }

    pub fn get(&self) -> PermissionMode {
        PermissionMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    pub fn set(&self, mode: PermissionMode) {
        tracing::info!(target: "quill.tools", mode = %mode, "Permission mode changed");
        self.mode.store(mode.to_u8(), Ordering::SeqCst);
    }
}

impl Default for PermissionModeHandle {
    fn default() -> Self {
        Self::new(PermissionMode::default())
    }
}

/// Request for permission to perform an action
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    /// Name of the tool requesting permission
    pub tool_name: String,
    /// Human-readable description of the action
    pub action_description: String,
    /// Paths that will be affected
    pub affected_paths: Vec<String>,
    pub risk: RiskClass,
}

impl PermissionRequest {
    pub fn for_tool_request(request: &ToolRequest) -> Self {
        let tool = request.tool();
        let (action_description, affected_paths) = match request {
            ToolRequest::Read { path } => (format!("Read {}", path), vec![path.clone()]),
            ToolRequest::Write { path, content } => (
                format!("Write {} bytes to {}", content.len(), path),
                vec![path.clone()],
            ),
            ToolRequest::Edit { path, .. } => (format!("Edit {}", path), vec![path.clone()]),
            ToolRequest::Delete { path } => (format!("Delete {}", path), vec![path.clone()]),
            ToolRequest::Bash { command } => (format!("Run `{}`", command), Vec::new()),
            ToolRequest::Script { language, code } => (
                format!(
                    "Run a {} line script with {}",
                    code.lines().count(),
                    language.interpreter()
                ),
                Vec::new(),
            ),
            ToolRequest::Grep { pattern, path } | ToolRequest::Glob { pattern, path } => (
                format!("Search for '{}'", pattern),
                path.iter().cloned().collect(),
            ),
            ToolRequest::Ls { path } => (format!("List {}", path), vec![path.clone()]),
            ToolRequest::Git { args } => (format!("Run `git {}`", args), Vec::new()),
            ToolRequest::Unknown { name } => (format!("Call unknown tool '{}'", name), Vec::new()),
            ToolRequest::Invalid { reason, .. } => (reason.clone(), Vec::new()),
        };
        Self {
            tool_name: tool.to_string(),
            action_description,
            affected_paths,
            risk: tool.risk_class(),
        }
    }
}

/// Resolves "ask" decisions
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, request: &PermissionRequest) -> bool;
}

/// Approves everything
pub struct AllowAllApprover;

#[async_trait]
impl Approver for AllowAllApprover {
    async fn approve(&self, _request: &PermissionRequest) -> bool {
        true
    }
}

/// Refuses everything; the right choice when nobody is at the terminal
pub struct DenyAllApprover;

#[async_trait]
impl Approver for DenyAllApprover {
    async fn approve(&self, _request: &PermissionRequest) -> bool {
        false
    }
}

/// Interactive approver prompting on stdin
#[derive(Default)]
pub struct StdinApprover {
    /// Tools that have been granted "allow all" permission
    allowed_tools: Mutex<HashSet<String>>,
}

impl StdinApprover {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Approver for StdinApprover {
    async fn approve(&self, request: &PermissionRequest) -> bool {
        if self.allowed_tools.lock().await.contains(&request.tool_name) {
            return true;
        }

        let prompt_request = request.clone();
        let answer = tokio::task::spawn_blocking(move || prompt(&prompt_request)).await;
        match answer {
            Ok(Ok(PromptAnswer::Yes)) => true,
            Ok(Ok(PromptAnswer::AllowTool)) => {
                self.allowed_tools
                    .lock()
                    .await
                    .insert(request.tool_name.clone());
                true
            }
            Ok(Ok(PromptAnswer::No)) => false,
            Ok(Err(e)) => {
                tracing::warn!(target: "quill.tools", error = %e, "Permission prompt failed, denying");
                false
            }
            Err(e) => {
                tracing::warn!(target: "quill.tools", error = %e, "Permission prompt task failed, denying");
                false
            }
        }
    }
}

enum PromptAnswer {
    Yes,
    No,
    AllowTool,
}

fn prompt(request: &PermissionRequest) -> io::Result<PromptAnswer> {
    let mut stderr = io::stderr();

    eprintln!();
    stderr.execute(SetForegroundColor(Color::Yellow))?;
    eprint!("⚠ ");
    stderr.execute(ResetColor)?;

    eprintln!("Tool '{}' wants to:", request.tool_name);
    eprintln!("  {}", request.action_description);

    if !request.affected_paths.is_empty() {
        eprintln!("  Affected paths:");
        for path in &request.affected_paths {
            if request.risk != RiskClass::Safe {
                stderr.execute(SetForegroundColor(Color::Red))?;
            }
            eprintln!("    - {}", path);
            stderr.execute(ResetColor)?;
        }
    }

    eprint!("Allow? [y]es / [n]o / [a]llow all for this tool: ");
    stderr.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(match input.trim().to_lowercase().as_str() {
        "y" | "yes" => PromptAnswer::Yes,
        "a" | "allow" => PromptAnswer::AllowTool,
        _ => PromptAnswer::No,
    })
}

/// Outcome of passing one call through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allowed,
    Denied(String),
}

/// Permission gate between turn parsing and execution
#[derive(Clone)]
pub struct PermissionGate {
    mode: PermissionModeHandle,
    approver: Arc<dyn Approver>,
}

impl PermissionGate {
    pub fn new(mode: PermissionModeHandle, approver: Arc<dyn Approver>) -> Self {
        Self { mode, approver }
    }

    pub fn mode(&self) -> &PermissionModeHandle {
        &self.mode
    }

    /// Verdict for a tool in the current mode, before asking anyone
    pub fn decision(&self, tool: &ToolName) -> PermissionDecision {
        self.mode.get().decide(tool.risk_class())
    }

    pub async fn check(&self, request: &ToolRequest) -> GateOutcome {
        let tool = request.tool();
        let mode = self.mode.get();

        match mode.decide(tool.risk_class()) {
            PermissionDecision::Allow => GateOutcome::Allowed,
            PermissionDecision::Deny => {
                tracing::info!(target: "quill.tools", tool = %tool, mode = %mode, "Tool refused by mode");
                GateOutcome::Denied(format!(
                    "Permission denied: '{}' is not allowed in {} mode",
                    tool, mode
                ))
            }
            PermissionDecision::Ask => {
                let permission = PermissionRequest::for_tool_request(request);
                if self.approver.approve(&permission).await {
                    GateOutcome::Allowed
                } else {
                    tracing::info!(target: "quill.tools", tool = %tool, "Tool denied by user");
                    GateOutcome::Denied("Permission denied by user".to_string())
                }
            }
        }
    }
}
