// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Collects the tokens of one provider round into the pieces the loop needs
//! afterwards. Kept free of I/O so it can be tested directly.

use crate::llm::provider::{StreamToken, ToolCallData, Usage};

/// Accumulator for one streamed turn
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    reasoning: String,
    tool_calls: Vec<ToolCallData>,
    usage: Usage,
    tokens: usize,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one token into the turn
    pub fn push(&mut self, token: &StreamToken) {
        self.tokens += 1;
        match token {
            StreamToken::Content(text) => self.text.push_str(text),
            StreamToken::Reasoning(text) => self.reasoning.push_str(text),
            StreamToken::ToolCall(call) => self.tool_calls.push(call.clone()),
            StreamToken::Usage(usage) => self.usage.merge(usage),
        }
    }

    /// Assistant-visible text so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Native tool calls, in arrival order
    pub fn tool_calls(&self) -> &[ToolCallData] {
        &self.tool_calls
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Number of tokens folded in
    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }

    /// Consume the accumulator
    pub fn finish(self) -> FinishedTurn {
        FinishedTurn {
            text: self.text,
            reasoning: self.reasoning,
            tool_calls: self.tool_calls,
            usage: self.usage,
        }
    }
}

/// Everything one provider round produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishedTurn {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallData>,
    pub usage: Usage,
}
