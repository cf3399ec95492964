// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Quill - terminal coding agent core.
//!
//! This crate exposes the runtime shared by the `quill` CLI and any embedder:
//! - `llm`: one streaming client over three wire dialects (OpenAI-compatible,
//!   Anthropic, Gemini) normalized into a single token vocabulary
//! - `tools`: tool extraction, the permission gate, the dispatcher and the
//!   bounded undo ledger
//! - `chat`: the multi-turn orchestration loop with turn, repeat and failure
//!   limits plus cooperative cancellation
//! - `config`: settings file, provider presets and client resolution
//! - `cli`: argument parsing and terminal rendering for the binary

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod tools;

pub use error::{ApiError, QuillError, Result};
