// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Undo ledger
//!
//! A bounded FIFO of reversible file mutations. The executor pushes an entry
//! before every write, edit or delete; [`UndoService`] pops the newest entry
//! and restores the file. The ledger sits behind an async mutex so pushes and
//! pops are serialized even when the executor and an undo command share it.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default number of entries kept
pub const DEFAULT_UNDO_CAPACITY: usize = 50;

/// Kind of mutation an entry reverses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Write,
    Edit,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Write => write!(f, "write"),
            ChangeKind::Edit => write!(f, "edit"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One reversible mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub file_path: PathBuf,
    /// Content before the mutation; `None` when the file did not exist
    pub previous_content: Option<String>,
    /// Content after the mutation; `None` for deletes
    pub new_content: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl Change {
    pub fn new(
        kind: ChangeKind,
        file_path: PathBuf,
        previous_content: Option<String>,
        new_content: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file_path,
            previous_content,
            new_content,
            timestamp: Utc::now(),
            description: description.into(),
        }
    }

    /// Put the file back the way it was before the mutation.
    pub fn revert(&self) -> std::io::Result<()> {
        match &self.previous_content {
            Some(content) => {
                if let Some(parent) = self.file_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.file_path, content)
            }
            None => match std::fs::remove_file(&self.file_path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        }
    }
}

/// Bounded FIFO of [`Change`]s in mutation order
#[derive(Debug)]
pub struct UndoLedger {
    entries: VecDeque<Change>,
    capacity: usize,
}

impl UndoLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, change: Change) {
        self.push_evicting(change);
    }

    fn push_evicting(&mut self, change: Change) -> Option<Change> {
        let mut evicted = None;
        if self.entries.len() == self.capacity {
            evicted = self.entries.pop_front();
            if let Some(evicted) = &evicted {
                tracing::debug!(
                    target: "quill.tools",
                    path = %evicted.file_path.display(),
                    "Undo ledger full, evicting oldest entry"
                );
            }
        }
        self.entries.push_back(change);
        evicted
    }

    /// Record `change`, then run `apply`.
    ///
    /// If `apply` fails the entry is withdrawn and any entry it evicted is
    /// put back, leaving the ledger as it was.
    pub fn record<T, E>(
        &mut self,
        change: Change,
        apply: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let evicted = self.push_evicting(change);
        match apply() {
            Ok(value) => Ok(value),
            Err(e) => {
                if let Some(withdrawn) = self.entries.pop_back() {
                    tracing::debug!(
                        target: "quill.tools",
                        path = %withdrawn.file_path.display(),
                        "Mutation failed, withdrawing undo entry"
                    );
                }
                if let Some(evicted) = evicted {
                    self.entries.push_front(evicted);
                }
                Err(e)
            }
        }
    }

    /// Remove and return the newest entry.
    pub fn pop(&mut self) -> Option<Change> {
        self.entries.pop_back()
    }

    pub fn last(&self) -> Option<&Change> {
        self.entries.back()
    }

    /// Entries oldest first
    pub fn entries(&self) -> impl Iterator<Item = &Change> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

/// Ledger handle shared by the executor and undo consumers
pub type SharedLedger = Arc<Mutex<UndoLedger>>;

/// Create a shared ledger with the given capacity
pub fn shared_ledger(capacity: usize) -> SharedLedger {
    Arc::new(Mutex::new(UndoLedger::new(capacity)))
}

/// Result of an undo request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoOutcome {
    pub success: bool,
    pub message: String,
}

/// Undo command backend
#[derive(Debug, Clone)]
pub struct UndoService {
    ledger: SharedLedger,
}

impl UndoService {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    /// Revert the newest change. A failed revert leaves the entry in place.
    pub async fn pop_and_revert(&self) -> UndoOutcome {
        let mut ledger = self.ledger.lock().await;
        let Some(change) = ledger.pop() else {
            return UndoOutcome {
                success: false,
                message: "Nothing to undo".to_string(),
            };
        };

        match change.revert() {
            Ok(()) => {
                tracing::info!(
                    target: "quill.tools",
                    kind = %change.kind,
                    path = %change.file_path.display(),
                    "Reverted change"
                );
                let action = if change.previous_content.is_some() {
                    "Restored"
                } else {
                    "Removed"
                };
                UndoOutcome {
                    success: true,
                    message: format!(
                        "{} {} (undid {}: {})",
                        action,
                        change.file_path.display(),
                        change.kind,
                        change.description
                    ),
                }
            }
            Err(e) => {
                let message = format!(
                    "Failed to revert {}: {}",
                    change.file_path.display(),
                    e
                );
                ledger.push(change);
                UndoOutcome {
                    success: false,
                    message,
                }
            }
        }
    }

    /// Number of entries available to undo
    pub async fn pending(&self) -> usize {
        self.ledger.lock().await.len()
    }
}
