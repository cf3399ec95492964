// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for Quill
//!
//! Provides the normalized token stream over different LLM providers.

pub mod client;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod sse;

pub use client::StreamingClient;
pub use message::*;
pub use provider::*;
