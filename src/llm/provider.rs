// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and the normalized token vocabulary
//!
//! Every backend, whatever its wire grammar, is reduced to a stream of
//! [`StreamToken`]s.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::message::Message;

/// Lazy, finite, non-restartable sequence of tokens for one request
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamToken>> + Send>>;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "openrouter")
    fn name(&self) -> &str;

    /// Model the provider will request
    fn model(&self) -> &str;

    /// Open a token stream for the conversation.
    ///
    /// Transport failures before the first token are returned as `Err`.
    /// The stream ends early, without error, once `cancel` fires.
    async fn stream(&self, messages: &[Message], cancel: CancellationToken) -> Result<TokenStream>;
}

/// One unit of the normalized stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamToken {
    /// Assistant-visible text fragment
    Content(String),
    /// Hidden deliberation fragment
    Reasoning(String),
    /// A completed, fully assembled tool invocation request
    ToolCall(ToolCallData),
    /// Token accounting for the turn
    Usage(Usage),
}

/// A native tool call as assembled by a wire adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    /// Raw argument text, normally a JSON object
    pub arguments: String,
}

impl ToolCallData {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Token usage statistics
///
/// Fields are optional because providers report them piecemeal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Cache read tokens (if caching enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            cache_read_input_tokens: None,
        }
    }

    /// Overlay the fields present in `other`, keeping the rest.
    pub fn merge(&mut self, other: &Usage) {
        if other.input_tokens.is_some() {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens.is_some() {
            self.output_tokens = other.output_tokens;
        }
        if other.cache_read_input_tokens.is_some() {
            self.cache_read_input_tokens = other.cache_read_input_tokens;
        }
    }

    /// Sum per-turn usage into a running total.
    pub fn accumulate(&mut self, other: &Usage) {
        fn add(a: Option<u32>, b: Option<u32>) -> Option<u32> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
            }
        }
        self.input_tokens = add(self.input_tokens, other.input_tokens);
        self.output_tokens = add(self.output_tokens, other.output_tokens);
        self.cache_read_input_tokens =
            add(self.cache_read_input_tokens, other.cache_read_input_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.cache_read_input_tokens.is_none()
    }

    pub fn total(&self) -> u32 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.output_tokens.unwrap_or(0))
    }
}
