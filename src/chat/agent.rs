// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent loop handling for chat
//!
//! The pure pieces of the orchestration loop: its limits, repeat detection,
//! failure tracking and the feedback message sent back after each round.
//! The code is structured to maximize testability.

use crate::config::AgentSettings;
use crate::tools::{
    truncate_output, ToolInvocation, ToolName, ToolResult, ToolStatus, UNKNOWN_TOOL_MARKER,
};

/// Per-result cap inside a feedback message
pub const MAX_FEEDBACK_RESULT_BYTES: usize = 8_000;

/// Configuration for the agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLoopConfig {
    /// Streaming rounds allowed per user submission
    pub max_turns: u32,
    /// Rounds in a row where every call failed before the loop stops
    pub max_consecutive_failures: u32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for AgentLoopConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_turns: settings.max_turns.max(1),
            max_consecutive_failures: settings.max_consecutive_failures.max(1),
        }
    }
}

/// System prompt teaching the tag grammar
pub fn system_prompt(working_directory: &std::path::Path) -> String {
    format!(
        "You are Quill, a coding assistant working in {}.\n\
         Call tools by writing tags in your reply. Available tools: {}.\n\n\
         <tool:read>path</tool>\n\
         <tool:write>path\nfull file content</tool>\n\
         <tool:edit>path\n<<<\nexact old text\n>>>\nnew text</tool>\n\
         <tool:delete>path</tool>\n\
         <tool:bash>command</tool>\n\
         <tool:grep>regex\noptional path</tool>\n\
         <tool:glob>pattern\noptional base path</tool>\n\
         <tool:ls>path</tool>\n\
         <tool:git>arguments</tool>\n\n\
         Results come back in the next message. When the task is done, answer without tags.",
        working_directory.display(),
        ToolName::known_list()
    )
}

/// Identify a round by its tool names and primary arguments, in order
pub fn round_signature(invocations: &[ToolInvocation]) -> String {
    invocations
        .iter()
        .map(|inv| format!("{}({})", inv.tool(), inv.request.primary_arg().trim()))
        .collect::<Vec<_>>()
        .join(";")
}

/// Counts rounds in a row where every tool call failed
#[derive(Debug, Clone)]
pub struct FailureTracker {
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    /// Record a round. Returns true once the threshold is reached.
    ///
    /// All failed: +1. All succeeded: reset. Mixed: unchanged.
    pub fn record(&mut self, results: &[ToolResult]) -> bool {
        if !results.is_empty() {
            if results.iter().all(|r| !r.is_success()) {
                self.consecutive += 1;
            } else if results.iter().all(|r| r.is_success()) {
                self.consecutive = 0;
            }
        }
        self.exhausted()
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn exhausted(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

fn result_label(result: &ToolResult) -> String {
    match (&result.file_path, &result.command) {
        (Some(path), _) => format!("{} {}", result.tool, path),
        (None, Some(command)) => format!("{} `{}`", result.tool, command),
        (None, None) => result.tool.clone(),
    }
}

/// Build the single user message that reports a round's results
pub fn build_feedback(results: &[ToolResult]) -> String {
    let mut feedback = String::from("Tool results:\n");

    for (i, result) in results.iter().enumerate() {
        let status = match result.status {
            ToolStatus::Success => "OK",
            ToolStatus::Failed => "FAILED",
            ToolStatus::Denied => "DENIED",
        };
        feedback.push_str(&format!("\n[{}] {}: {}\n", i + 1, result_label(result), status));
        if result.status == ToolStatus::Denied {
            feedback.push_str("The user did not allow this call. Do not retry it.\n");
        }
        let body = truncate_output(&result.result, MAX_FEEDBACK_RESULT_BYTES);
        if !body.trim().is_empty() {
            feedback.push_str(body.trim_end());
            feedback.push('\n');
        }
    }

    if results.iter().any(|r| r.is_unknown_tool()) {
        feedback.push_str(&format!(
            "\n{} Only these tools exist: {}. Call them as <tool:NAME>ARGS</tool>.\n",
            UNKNOWN_TOOL_MARKER,
            ToolName::known_list()
        ));
    }

    feedback.push_str(
        "\nContinue with the task. Stop calling tools unless necessary to finish it; \
         if the task is complete, reply with the final answer.",
    );
    feedback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{InvocationSource, ToolRequest};

    fn bash(command: &str) -> ToolInvocation {
        ToolInvocation::new(
            uuid::Uuid::new_v4().to_string(),
            ToolRequest::Bash {
                command: command.to_string(),
            },
            InvocationSource::Tagged,
        )
    }

    #[test]
    fn test_default_config() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.max_consecutive_failures, 4);
    }

    #[test]
    fn test_system_prompt_parses_as_examples() {
        let prompt = system_prompt(std::path::Path::new("/work"));
        assert!(prompt.contains("/work"));
        // Every example tag in the prompt is well-formed
        let parsed = crate::tools::parser::parse_tagged(&prompt);
        assert_eq!(parsed.len(), 9);
        assert!(parsed
            .iter()
            .all(|r| !matches!(r, ToolRequest::Unknown { .. } | ToolRequest::Invalid { .. })));
    }

    #[test]
    fn test_signature_ignores_ids_and_keeps_order() {
        assert_eq!(round_signature(&[bash("ls")]), round_signature(&[bash("ls")]));
        assert_eq!(round_signature(&[bash("ls")]), "bash(ls)");
        assert_ne!(
            round_signature(&[bash("ls"), bash("pwd")]),
            round_signature(&[bash("pwd"), bash("ls")])
        );
    }

    #[test]
    fn test_failure_tracker_rules() {
        let ok = ToolResult::ok("1", "ls", "");
        let failed = ToolResult::failed("2", "read", "nope");
        let mut tracker = FailureTracker::new(3);

        assert!(!tracker.record(&[failed.clone()]));
        assert!(!tracker.record(&[failed.clone(), ok.clone()]));
        assert_eq!(tracker.consecutive(), 1);
        assert!(!tracker.record(&[failed.clone()]));
        assert!(!tracker.record(&[ok.clone()]));
        assert_eq!(tracker.consecutive(), 0);

        for _ in 0..2 {
            assert!(!tracker.record(&[failed.clone()]));
        }
        assert!(tracker.record(&[failed]));
    }

    #[test]
    fn test_feedback_marks_status_and_nudges() {
        let results = vec![
            ToolResult::ok("1", "read", "fn main() {}").with_file_path("src/main.rs"),
            ToolResult::denied("2", "bash", "Permission denied by user").with_command("rm x"),
        ];
        let feedback = build_feedback(&results);
        assert!(feedback.contains("[1] read src/main.rs: OK"));
        assert!(feedback.contains("fn main() {}"));
        assert!(feedback.contains("[2] bash `rm x`: DENIED"));
        assert!(feedback.contains("Do not retry"));
        assert!(feedback.contains("Stop calling tools unless necessary"));
        assert!(!feedback.contains("Only these tools exist"));
    }

    #[test]
    fn test_feedback_lists_valid_tools_for_unknown() {
        let result = ToolResult::failed(
            "1",
            "teleport",
            format!("{} 'teleport'", UNKNOWN_TOOL_MARKER),
        );
        let feedback = build_feedback(&[result]);
        assert!(feedback.contains("read, write, edit, delete, bash, grep, glob, ls, git"));
    }

    #[test]
    fn test_feedback_caps_each_result() {
        let big = "x".repeat(MAX_FEEDBACK_RESULT_BYTES * 2);
        let feedback = build_feedback(&[ToolResult::ok("1", "read", big)]);
        assert!(feedback.len() < MAX_FEEDBACK_RESULT_BYTES + 1_000);
        assert!(feedback.contains("output truncated"));
    }
}
