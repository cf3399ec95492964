// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-process tool counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tools::{ToolName, ToolResult};

#[derive(Debug, Default)]
pub struct ToolStats {
    calls: AtomicU64,
    failures: AtomicU64,
    denials: AtomicU64,
    files_read: AtomicU64,
    files_written: AtomicU64,
    files_edited: AtomicU64,
    files_deleted: AtomicU64,
    shell_commands: AtomicU64,
}

/// Point-in-time copy of [`ToolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ToolStatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub denials: u64,
    pub files_read: u64,
    pub files_written: u64,
    pub files_edited: u64,
    pub files_deleted: u64,
    pub shell_commands: u64,
}

impl ToolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished call. File counters only move on success.
    pub fn record(&self, tool: &ToolName, result: &ToolResult) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if result.is_denied() {
            self.denials.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if !result.is_success() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match tool {
            ToolName::Bash | ToolName::Git => Some(&self.shell_commands),
            _ if !result.is_success() => None,
            ToolName::Read => Some(&self.files_read),
            ToolName::Write => Some(&self.files_written),
            ToolName::Edit => Some(&self.files_edited),
            ToolName::Delete => Some(&self.files_deleted),
            _ => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ToolStatsSnapshot {
        ToolStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            files_read: self.files_read.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            files_edited: self.files_edited.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            shell_commands: self.shell_commands.load(Ordering::Relaxed),
        }
    }
}
