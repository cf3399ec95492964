// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat orchestration
//!
//! The multi-turn agent loop and the pieces it is built from.

pub mod agent;
pub mod engine;
pub mod session;
pub mod streaming;

pub use agent::{AgentLoopConfig, FailureTracker};
pub use engine::{
    AgentLoopObserver, AgentRunner, ExitReason, LoopOutcome, LoopState, NoopAgentLoopObserver,
};
pub use session::{ConversationStore, InMemoryConversationStore};
pub use streaming::TurnAccumulator;
