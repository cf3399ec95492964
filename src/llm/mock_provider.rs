// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Plays back scripted token sequences, one per `stream` call, without any
//! network access.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::message::Message;
use crate::llm::provider::{LlmProvider, StreamToken, TokenStream, ToolCallData, Usage};
use crate::llm::providers::common::http_status_error;

/// One scripted provider round
#[derive(Clone, Debug)]
pub enum MockTurn {
    /// Yield these tokens, in order
    Tokens(Vec<StreamToken>),
    /// Fail before the first token with this HTTP status
    HttpError { status: u16, body: String },
}

impl MockTurn {
    /// A plain text answer
    pub fn text(text: impl Into<String>) -> Self {
        MockTurn::Tokens(vec![StreamToken::Content(text.into())])
    }

    /// Text followed by one native tool call
    pub fn tool_call(text: impl Into<String>, name: &str, arguments: &str) -> Self {
        MockTurn::Tokens(vec![
            StreamToken::Content(text.into()),
            StreamToken::ToolCall(ToolCallData::new(
                format!("call_{}", uuid::Uuid::new_v4().simple()),
                name,
                arguments,
            )),
            StreamToken::Usage(Usage::new(10, 5)),
        ])
    }
}

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    turns: Arc<Mutex<VecDeque<MockTurn>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<Vec<Message>>>>,
    token_delay: Option<Duration>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a mock provider with an empty script
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            turns: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(Vec::new())),
            token_delay: None,
        }
    }

    /// Create a mock provider that plays `turns` in order
    pub fn with_turns(turns: Vec<MockTurn>) -> Self {
        let provider = Self::new();
        for turn in turns {
            provider.push_turn(turn);
        }
        provider
    }

    /// Sleep before each token, so tests can cancel mid-stream
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Append a turn to the script
    pub fn push_turn(&self, turn: MockTurn) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(turn);
    }

    /// Number of `stream` calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Conversations passed to each `stream` call
    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.recorded_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[Message], cancel: CancellationToken) -> Result<TokenStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.recorded_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let turn = self
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| MockTurn::text("Done."));

        let tokens = match turn {
            MockTurn::Tokens(tokens) => tokens,
            MockTurn::HttpError { status, body } => {
                return Err(http_status_error(status, &body).into());
            }
        };

        let delay = self.token_delay;
        let stream = async_stream::stream! {
            for token in tokens {
                if let Some(delay) = delay {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(token);
            }
        };
        Ok(Box::pin(stream))
    }
}
