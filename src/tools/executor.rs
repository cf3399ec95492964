// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution engine
//!
//! Runs parsed invocations through the permission gate and the builtin tool
//! implementations. Every invocation produces exactly one [`ToolResult`];
//! failures are results, never errors.

use std::sync::Arc;

use super::builtin::{self, shell::CommandOutput, FileMutation};
use super::changes::SharedLedger;
use super::permission::{GateOutcome, PermissionGate};
use super::stats::ToolStats;
use super::{ToolContext, ToolInvocation, ToolName, ToolRequest, ToolResult, UNKNOWN_TOOL_MARKER};

/// Tool executor that handles permission checks, execution and accounting
#[derive(Clone)]
pub struct ToolExecutor {
    context: ToolContext,
    ledger: SharedLedger,
    gate: PermissionGate,
    stats: Arc<ToolStats>,
}

impl ToolExecutor {
    /// Create a new executor around injected ledger and gate
    pub fn new(context: ToolContext, ledger: SharedLedger, gate: PermissionGate) -> Self {
        Self {
            context,
            ledger,
            gate,
            stats: Arc::new(ToolStats::new()),
        }
    }

    /// Share an existing counter set instead of a fresh one
    pub fn with_stats(mut self, stats: Arc<ToolStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn stats(&self) -> &Arc<ToolStats> {
        &self.stats
    }

    /// Execute one invocation
    pub async fn execute(&self, invocation: &ToolInvocation) -> ToolResult {
        let tool = invocation.tool();
        let id = invocation.id.as_str();

        let result = match &invocation.request {
            ToolRequest::Unknown { name } => {
                tracing::debug!(target: "quill.tools", tool = %name, "Unknown tool requested");
                ToolResult::failed(
                    id,
                    name.as_str(),
                    format!(
                        "{} '{}'. Valid tools: {}",
                        UNKNOWN_TOOL_MARKER,
                        name,
                        ToolName::known_list()
                    ),
                )
            }
            ToolRequest::Invalid { tool, reason } => ToolResult::failed(
                id,
                tool.as_str(),
                format!("Invalid arguments for {}: {}", tool, reason),
            ),
            request => match self.gate.check(request).await {
                GateOutcome::Denied(reason) => ToolResult::denied(id, tool.as_str(), reason),
                GateOutcome::Allowed => self.dispatch(id, request).await,
            },
        };

        tracing::debug!(
            target: "quill.tools",
            tool = %tool,
            status = ?result.status,
            "Tool call finished"
        );
        self.stats.record(&tool, &result);
        result
    }

    /// Execute a round of invocations in order
    pub async fn execute_all(&self, invocations: &[ToolInvocation]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            results.push(self.execute(invocation).await);
        }
        results
    }

    async fn dispatch(&self, id: &str, request: &ToolRequest) -> ToolResult {
        let ctx = &self.context;
        let tool = request.tool();
        let name = tool.as_str();

        match request {
            ToolRequest::Read { path } => match builtin::file_read::execute(ctx, path).await {
                Ok(content) => ToolResult::ok(id, name, content).with_file_path(path.as_str()),
                Err(reason) => ToolResult::failed(id, name, reason).with_file_path(path.as_str()),
            },
            ToolRequest::Write { path, content } => mutation_result(
                id,
                name,
                builtin::file_write::execute(ctx, &self.ledger, path, content).await,
            ),
            ToolRequest::Edit {
                path,
                old_text,
                new_text,
            } => mutation_result(
                id,
                name,
                builtin::file_edit::execute(ctx, &self.ledger, path, old_text, new_text).await,
            ),
            ToolRequest::Delete { path } => mutation_result(
                id,
                name,
                builtin::file_delete::execute(ctx, &self.ledger, path).await,
            ),
            ToolRequest::Bash { command } => command_result(
                id,
                name,
                command,
                builtin::shell::execute(ctx, command).await,
            ),
            ToolRequest::Script { language, code } => command_result(
                id,
                name,
                &format!("{} -c", language.interpreter()),
                builtin::shell::execute_script(ctx, *language, code).await,
            ),
            ToolRequest::Git { args } => command_result(
                id,
                name,
                &format!("git {}", args),
                builtin::git::execute(ctx, args).await,
            ),
            ToolRequest::Grep { pattern, path } => text_result(
                id,
                name,
                builtin::grep::execute(ctx, pattern, path.as_deref()).await,
            ),
            ToolRequest::Glob { pattern, path } => text_result(
                id,
                name,
                builtin::glob::execute(ctx, pattern, path.as_deref()).await,
            ),
            ToolRequest::Ls { path } => text_result(id, name, builtin::ls::execute(ctx, path).await),
            ToolRequest::Unknown { .. } | ToolRequest::Invalid { .. } => {
                ToolResult::failed(id, name, "not an executable tool call")
            }
        }
    }
}

fn text_result(id: &str, tool: &str, outcome: Result<String, String>) -> ToolResult {
    match outcome {
        Ok(output) => ToolResult::ok(id, tool, output),
        Err(reason) => ToolResult::failed(id, tool, reason),
    }
}

fn mutation_result(id: &str, tool: &str, outcome: Result<FileMutation, String>) -> ToolResult {
    match outcome {
        Ok(mutation) => ToolResult::ok(id, tool, mutation.message.as_str())
            .with_diff(mutation.diff())
            .with_file_path(mutation.display_path.as_str())
            .with_lines_changed(mutation.lines_changed),
        Err(reason) => ToolResult::failed(id, tool, reason),
    }
}

fn command_result(
    id: &str,
    tool: &str,
    command: &str,
    outcome: Result<CommandOutput, String>,
) -> ToolResult {
    let result = match outcome {
        Ok(output) if output.success() => ToolResult::ok(id, tool, output.render()),
        Ok(output) => ToolResult::failed(id, tool, output.render()),
        Err(reason) => ToolResult::failed(id, tool, reason),
    };
    result.with_command(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::changes::shared_ledger;
    use crate::tools::permission::{AllowAllApprover, DenyAllApprover};
    use crate::tools::{InvocationSource, PermissionMode, PermissionModeHandle, ToolStatus};
    use tempfile::TempDir;

    fn executor(temp_dir: &TempDir, mode: PermissionMode, allow: bool) -> ToolExecutor {
        let approver: Arc<dyn crate::tools::permission::Approver> = if allow {
            Arc::new(AllowAllApprover)
        } else {
            Arc::new(DenyAllApprover)
        };
        ToolExecutor::new(
            ToolContext::new(temp_dir.path().to_path_buf()),
            shared_ledger(50),
            PermissionGate::new(PermissionModeHandle::new(mode), approver),
        )
    }

    fn invocation(request: ToolRequest) -> ToolInvocation {
        ToolInvocation::new("call_1", request, InvocationSource::Tagged)
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_valid_tools() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Auto, true);

        let result = executor
            .execute(&invocation(ToolRequest::Unknown {
                name: "teleport".to_string(),
            }))
            .await;
        assert!(result.is_unknown_tool());
        assert!(result.result.contains("read, write, edit"));
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn test_write_result_carries_diff() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Auto, true);

        let result = executor
            .execute(&invocation(ToolRequest::Write {
                path: "a.txt".to_string(),
                content: "hello\n".to_string(),
            }))
            .await;
        assert!(result.is_success());
        assert_eq!(result.file_path.as_deref(), Some("a.txt"));
        assert_eq!(result.lines_changed, Some(1));
        let diff = result.diff.unwrap();
        assert_eq!(diff.old_content, "");
        assert_eq!(diff.new_content, "hello\n");
        assert_eq!(executor.ledger().lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_denied_call_never_executes() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Ask, false);

        let result = executor
            .execute(&invocation(ToolRequest::Write {
                path: "a.txt".to_string(),
                content: "x".to_string(),
            }))
            .await;
        assert_eq!(result.status, ToolStatus::Denied);
        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(executor.ledger().lock().await.is_empty());
        assert_eq!(executor.stats().snapshot().denials, 1);
    }

    #[tokio::test]
    async fn test_safe_call_not_gated_in_ask_mode() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("r.txt"), "data").unwrap();
        let executor = executor(&temp_dir, PermissionMode::Ask, false);

        let result = executor
            .execute(&invocation(ToolRequest::Read {
                path: "r.txt".to_string(),
            }))
            .await;
        assert!(result.is_success());
        assert_eq!(result.result, "data");
    }

    #[tokio::test]
    async fn test_bash_nonzero_exit_is_failure() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Auto, true);

        let result = executor
            .execute(&invocation(ToolRequest::Bash {
                command: "echo out; exit 3".to_string(),
            }))
            .await;
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.result.contains("Exit code: 3"));
        assert!(result.result.contains("out"));
        assert_eq!(result.command.as_deref(), Some("echo out; exit 3"));
        assert_eq!(executor.stats().snapshot().shell_commands, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_without_gate() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Strict, false);

        let result = executor
            .execute(&invocation(ToolRequest::Invalid {
                tool: ToolName::Edit,
                reason: "missing >>>".to_string(),
            }))
            .await;
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.result.contains("missing >>>"));
    }

    #[tokio::test]
    async fn test_execute_all_keeps_order_and_continues_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, PermissionMode::Auto, true);

        let results = executor
            .execute_all(&[
                ToolInvocation::new(
                    "1",
                    ToolRequest::Read {
                        path: "missing".to_string(),
                    },
                    InvocationSource::Native,
                ),
                ToolInvocation::new(
                    "2",
                    ToolRequest::Ls {
                        path: ".".to_string(),
                    },
                    InvocationSource::Native,
                ),
            ])
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "1");
        assert!(!results[0].is_success());
        assert!(results[1].is_success());
    }
}
