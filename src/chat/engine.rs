// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Orchestration loop
//!
//! Streams a turn, extracts tool calls, runs them through the gate and the
//! executor, feeds the results back and repeats until the model stops
//! calling tools or a limit is hit. Loop exits are values, not errors.

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::chat::agent::{build_feedback, round_signature, AgentLoopConfig, FailureTracker};
use crate::chat::streaming::TurnAccumulator;
use crate::error::{QuillError, Result};
use crate::llm::message::{Conversation, Message};
use crate::llm::provider::{LlmProvider, StreamToken, Usage};
use crate::tools::parser::extract_invocations;
use crate::tools::{ToolExecutor, ToolInvocation, ToolResult};

/// Why the loop returned to idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The model answered without calling tools
    Completed,
    /// The turn budget ran out
    MaxTurns,
    /// The model repeated the previous round's tool calls
    RepeatedToolCalls,
    /// Too many rounds in a row where every call failed
    ConsecutiveFailures,
    /// The cancellation token fired
    Cancelled,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Completed => "completed",
            ExitReason::MaxTurns => "max turns",
            ExitReason::RepeatedToolCalls => "repeated tool calls",
            ExitReason::ConsecutiveFailures => "consecutive tool failures",
            ExitReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one loop run
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub reason: ExitReason,
    /// Text of the last streamed turn
    pub final_text: String,
    /// Streaming rounds started
    pub turns: u32,
    /// Usage summed over all rounds
    pub usage: Usage,
}

/// Loop state, reported to observers on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Streaming(u32),
    Dispatching(u32),
}

/// Output hooks for the agent loop.
///
/// Frontends can implement this trait to render text, status, and tool output.
pub trait AgentLoopObserver: Send {
    fn on_state(&mut self, _state: LoopState) -> Result<()> {
        Ok(())
    }

    fn on_content(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn on_reasoning(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn on_usage(&mut self, _usage: &Usage) -> Result<()> {
        Ok(())
    }

    fn on_tool_invocation(&mut self, _invocation: &ToolInvocation) -> Result<()> {
        Ok(())
    }

    fn on_tool_result(&mut self, _result: &ToolResult) -> Result<()> {
        Ok(())
    }

    fn on_exit(&mut self, _outcome: &LoopOutcome) -> Result<()> {
        Ok(())
    }
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default)]
pub struct NoopAgentLoopObserver;

impl AgentLoopObserver for NoopAgentLoopObserver {}

/// Drives the loop for one conversation.
///
/// `run` takes `&mut self`, so one runner never has two loops in flight.
pub struct AgentRunner {
    provider: Arc<dyn LlmProvider>,
    executor: ToolExecutor,
    config: AgentLoopConfig,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, executor: ToolExecutor) -> Self {
        Self {
            provider,
            executor,
            config: AgentLoopConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentLoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Run until idle. The conversation must already end with the user's
    /// message; assistant turns and tool feedback are appended to it.
    pub async fn run(
        &mut self,
        conversation: &mut Conversation,
        cancel: CancellationToken,
        observer: &mut dyn AgentLoopObserver,
    ) -> Result<LoopOutcome> {
        tracing::info!(
            target: "quill.chat.engine",
            provider = %self.provider.name(),
            model = %self.provider.model(),
            starting_messages = conversation.len(),
            max_turns = self.config.max_turns,
            "agent loop start"
        );

        let mut turn: u32 = 0;
        let mut total_usage = Usage::default();
        let mut final_text = String::new();
        let mut previous_signature: Option<String> = None;
        let mut failures = FailureTracker::new(self.config.max_consecutive_failures);

        let reason = loop {
            if cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }
            if turn >= self.config.max_turns {
                break ExitReason::MaxTurns;
            }
            turn += 1;

            observer.on_state(LoopState::Streaming(turn))?;
            tracing::debug!(
                target: "quill.chat.engine",
                turn,
                conversation_messages = conversation.len(),
                "starting model turn"
            );

            let mut stream = match self
                .provider
                .stream(conversation.messages(), cancel.clone())
                .await
            {
                Ok(stream) => stream,
                Err(QuillError::Cancelled) => break ExitReason::Cancelled,
                Err(e) => return Err(e),
            };

            let mut accumulator = TurnAccumulator::new();
            let mut cancelled = false;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = stream.next() => next,
                };
                let Some(token) = next else {
                    break;
                };
                let token = token?;
                match &token {
                    StreamToken::Content(text) => observer.on_content(text)?,
                    StreamToken::Reasoning(text) => observer.on_reasoning(text)?,
                    StreamToken::Usage(usage) => observer.on_usage(usage)?,
                    StreamToken::ToolCall(_) => {}
                }
                accumulator.push(&token);
            }
            drop(stream);

            let finished = accumulator.finish();
            total_usage.accumulate(&finished.usage);
            final_text = finished.text.clone();

            if cancelled || cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }

            let invocations = extract_invocations(&finished.text, &finished.tool_calls);
            if invocations.is_empty() {
                conversation.push(Message::assistant(finished.text));
                break ExitReason::Completed;
            }

            let signature = round_signature(&invocations);
            if previous_signature.as_deref() == Some(signature.as_str()) {
                tracing::warn!(
                    target: "quill.chat.engine",
                    turn,
                    signature = %signature,
                    "model repeated the previous round's tool calls"
                );
                conversation.push(Message::assistant(assistant_text(&finished.text, &invocations)));
                break ExitReason::RepeatedToolCalls;
            }

            observer.on_state(LoopState::Dispatching(turn))?;
            tracing::info!(
                target: "quill.chat.engine",
                turn,
                tool_calls = invocations.len(),
                "entering tool execution phase"
            );

            let mut results = Vec::with_capacity(invocations.len());
            for invocation in &invocations {
                if cancel.is_cancelled() {
                    break;
                }
                observer.on_tool_invocation(invocation)?;
                // A pending approval prompt or a running command is abandoned on cancel
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = self.executor.execute(invocation) => result,
                };
                observer.on_tool_result(&result)?;
                results.push(result);
            }

            conversation.push(Message::assistant(assistant_text(&finished.text, &invocations)));
            if !results.is_empty() {
                conversation.push(Message::user(build_feedback(&results)));
            }

            if cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }

            previous_signature = Some(signature);
            if failures.record(&results) {
                tracing::warn!(
                    target: "quill.chat.engine",
                    turn,
                    consecutive = failures.consecutive(),
                    "every tool call failed too many rounds in a row"
                );
                break ExitReason::ConsecutiveFailures;
            }
        };

        let outcome = LoopOutcome {
            reason,
            final_text,
            turns: turn,
            usage: total_usage,
        };

        observer.on_state(LoopState::Idle)?;
        observer.on_exit(&outcome)?;
        tracing::info!(
            target: "quill.chat.engine",
            reason = %outcome.reason,
            turns = outcome.turns,
            final_messages = conversation.len(),
            "agent loop complete"
        );
        Ok(outcome)
    }
}

/// Assistant message for a round whose text may be empty (native calls only)
fn assistant_text(text: &str, invocations: &[ToolInvocation]) -> String {
    if !text.trim().is_empty() {
        return text.to_string();
    }
    let called = invocations
        .iter()
        .map(|inv| inv.tool().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("(called tools: {})", called)
}
