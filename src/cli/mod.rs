// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for Quill
//!
//! Command-line argument parsing and terminal rendering for the `quill` binary.

pub mod args;
pub mod render;

pub use args::*;
pub use render::TerminalObserver;
