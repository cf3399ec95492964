// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Quill
//!
//! The tool vocabulary is closed: [`ToolName`] enumerates the nine tools the
//! model may call plus an explicit `Unknown` case. A parsed call becomes a
//! [`ToolRequest`] carrying typed arguments, passes the permission gate, and
//! is executed by the [`executor::ToolExecutor`] into exactly one
//! [`ToolResult`].

pub mod builtin;
pub mod changes;
pub mod definition;
pub mod executor;
pub mod parser;
pub mod permission;
pub mod stats;

pub use changes::{Change, ChangeKind, SharedLedger, UndoLedger, UndoService};
pub use definition::{SchemaBuilder, ToolDefinition};
pub use executor::ToolExecutor;
pub use permission::{PermissionDecision, PermissionGate, PermissionMode, PermissionModeHandle};
pub use stats::{ToolStats, ToolStatsSnapshot};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the result text for a call naming a tool outside the vocabulary.
/// The orchestration loop keys its "valid tools are ..." hint off it.
pub const UNKNOWN_TOOL_MARKER: &str = "[unknown tool]";

/// The fixed tool vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolName {
    Read,
    Write,
    Edit,
    Delete,
    Bash,
    Grep,
    Glob,
    Ls,
    Git,
    /// Anything else the model asked for
    Unknown(String),
}

/// Coarse danger classification driving the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskClass {
    /// Reads and searches
    Safe,
    /// File mutations and version control
    Moderate,
    /// Arbitrary command execution
    Dangerous,
}

impl ToolName {
    /// Every known tool, in vocabulary order
    pub fn known() -> [ToolName; 9] {
        [
            ToolName::Read,
            ToolName::Write,
            ToolName::Edit,
            ToolName::Delete,
            ToolName::Bash,
            ToolName::Grep,
            ToolName::Glob,
            ToolName::Ls,
            ToolName::Git,
        ]
    }

    /// Comma separated list of known tool names
    pub fn known_list() -> String {
        Self::known()
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Exact vocabulary lookup, as used by the tag grammar
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "read" => ToolName::Read,
            "write" => ToolName::Write,
            "edit" => ToolName::Edit,
            "delete" => ToolName::Delete,
            "bash" => ToolName::Bash,
            "grep" => ToolName::Grep,
            "glob" => ToolName::Glob,
            "ls" => ToolName::Ls,
            "git" => ToolName::Git,
            _ => ToolName::Unknown(name.trim().to_string()),
        }
    }

    /// Lookup that also accepts the names models commonly use for native
    /// function calls.
    pub fn from_alias(name: &str) -> Self {
        let canonical = match name.trim().to_ascii_lowercase().as_str() {
            "file_read" | "read_file" | "cat" | "view" => "read",
            "file_write" | "write_file" | "create_file" => "write",
            "file_edit" | "edit_file" | "str_replace" | "replace" => "edit",
            "file_delete" | "delete_file" | "rm" | "remove" => "delete",
            "shell" | "sh" | "run" | "exec" | "execute" | "run_command" | "terminal" => "bash",
            "search" | "search_code" | "ripgrep" | "rg" => "grep",
            "find" | "find_files" | "file_search" => "glob",
            "list" | "list_dir" | "list_directory" | "list_files" | "dir" => "ls",
            _ => return Self::parse(name),
        };
        Self::parse(canonical)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ToolName::Read => "read",
            ToolName::Write => "write",
            ToolName::Edit => "edit",
            ToolName::Delete => "delete",
            ToolName::Bash => "bash",
            ToolName::Grep => "grep",
            ToolName::Glob => "glob",
            ToolName::Ls => "ls",
            ToolName::Git => "git",
            ToolName::Unknown(name) => name,
        }
    }

    pub fn risk_class(&self) -> RiskClass {
        match self {
            ToolName::Read | ToolName::Grep | ToolName::Glob | ToolName::Ls => RiskClass::Safe,
            ToolName::Write | ToolName::Edit | ToolName::Delete | ToolName::Git => {
                RiskClass::Moderate
            }
            ToolName::Bash | ToolName::Unknown(_) => RiskClass::Dangerous,
        }
    }

    /// Tools that record an undo entry before touching the filesystem
    pub fn is_mutating(&self) -> bool {
        matches!(self, ToolName::Write | ToolName::Edit | ToolName::Delete)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scripting languages accepted from fenced code blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    Python,
}

impl ScriptLanguage {
    pub fn interpreter(&self) -> &'static str {
        match self {
            ScriptLanguage::Python => "python3",
        }
    }
}

/// A tool call with decoded, typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    Read { path: String },
    Write { path: String, content: String },
    Edit { path: String, old_text: String, new_text: String },
    Delete { path: String },
    Bash { command: String },
    Grep { pattern: String, path: Option<String> },
    Glob { pattern: String, path: Option<String> },
    Ls { path: String },
    Git { args: String },
    /// Script lifted from a fenced code block; runs under the `bash` gate
    Script { language: ScriptLanguage, code: String },
    /// Tool name outside the vocabulary
    Unknown { name: String },
    /// Known tool whose arguments did not fit its grammar
    Invalid { tool: ToolName, reason: String },
}

impl ToolRequest {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::Read { .. } => ToolName::Read,
            ToolRequest::Write { .. } => ToolName::Write,
            ToolRequest::Edit { .. } => ToolName::Edit,
            ToolRequest::Delete { .. } => ToolName::Delete,
            ToolRequest::Bash { .. } | ToolRequest::Script { .. } => ToolName::Bash,
            ToolRequest::Grep { .. } => ToolName::Grep,
            ToolRequest::Glob { .. } => ToolName::Glob,
            ToolRequest::Ls { .. } => ToolName::Ls,
            ToolRequest::Git { .. } => ToolName::Git,
            ToolRequest::Unknown { name } => ToolName::Unknown(name.clone()),
            ToolRequest::Invalid { tool, .. } => tool.clone(),
        }
    }

    /// The argument that identifies what the call acts on
    pub fn primary_arg(&self) -> &str {
        match self {
            ToolRequest::Read { path }
            | ToolRequest::Write { path, .. }
            | ToolRequest::Edit { path, .. }
            | ToolRequest::Delete { path }
            | ToolRequest::Ls { path } => path,
            ToolRequest::Bash { command } => command,
            ToolRequest::Grep { pattern, .. } | ToolRequest::Glob { pattern, .. } => pattern,
            ToolRequest::Git { args } => args,
            ToolRequest::Script { code, .. } => code,
            ToolRequest::Unknown { name } => name,
            ToolRequest::Invalid { reason, .. } => reason,
        }
    }
}

/// Which extraction path produced an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationSource {
    /// `<tool:NAME>ARGS</tool>` in the assistant text
    Tagged,
    /// A provider-native structured tool call
    Native,
    /// A fenced code block, as a last resort
    Fenced,
}

/// One tool call extracted from a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: String,
    pub request: ToolRequest,
    pub source: InvocationSource,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, request: ToolRequest, source: InvocationSource) -> Self {
        Self {
            id: id.into(),
            request,
            source,
        }
    }

    pub fn tool(&self) -> ToolName {
        self.request.tool()
    }
}

/// How an executed call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Failed,
    /// Blocked by the permission gate; never executed
    Denied,
}

/// Before/after content of a mutated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub file_path: String,
    pub old_content: String,
    pub new_content: String,
}

/// Result of one tool call. Created once, never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Invocation id this result answers
    pub call_id: String,
    pub tool: String,
    /// Raw result text fed back to the model
    pub result: String,
    pub status: ToolStatus,
    pub diff: Option<FileDiff>,
    pub file_path: Option<String>,
    pub command: Option<String>,
    pub lines_changed: Option<usize>,
}

impl ToolResult {
    fn with_status(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        result: impl Into<String>,
        status: ToolStatus,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            result: result.into(),
            status,
            diff: None,
            file_path: None,
            command: None,
            lines_changed: None,
        }
    }

    /// Create a successful result
    pub fn ok(call_id: impl Into<String>, tool: impl Into<String>, result: impl Into<String>) -> Self {
        Self::with_status(call_id, tool, result, ToolStatus::Success)
    }

    /// Create a failed result
    pub fn failed(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::with_status(call_id, tool, reason, ToolStatus::Failed)
    }

    /// Create a result for a call the permission gate refused
    pub fn denied(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::with_status(call_id, tool, reason, ToolStatus::Denied)
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn is_denied(&self) -> bool {
        self.status == ToolStatus::Denied
    }

    /// Whether the call named a tool outside the vocabulary
    pub fn is_unknown_tool(&self) -> bool {
        self.status == ToolStatus::Failed && self.result.starts_with(UNKNOWN_TOOL_MARKER)
    }

    pub fn with_diff(mut self, diff: FileDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_lines_changed(mut self, lines: usize) -> Self {
        self.lines_changed = Some(lines);
        self
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths resolve against
    pub working_directory: PathBuf,
    /// Upper bound for one shell or git command
    pub shell_timeout: Duration,
}

impl ToolContext {
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            shell_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    /// Resolve a tool path argument against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }

    /// Display form of `path` relative to the working directory, if inside it.
    pub fn make_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.working_directory)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Truncate tool output to `max_bytes` on a char boundary, noting the cut.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let kept = crate::llm::providers::common::truncate_utf8(output, max_bytes);
    format!(
        "{}\n... (output truncated, {} of {} bytes shown)",
        kept,
        kept.len(),
        output.len()
    )
}
