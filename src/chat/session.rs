// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation persistence
//!
//! The loop never persists anything itself; a [`ConversationStore`] is the
//! collaborator a frontend uses to save and restore conversations.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::error::Result;
use crate::llm::message::Message;

/// Metadata of a saved conversation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SavedConversation {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub saved_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// Persistence collaborator for conversations
pub trait ConversationStore: Send + Sync {
    /// Save a snapshot and return its id
    fn save(&self, name: &str, messages: &[Message], model: &str) -> Result<Uuid>;

    /// Messages of a snapshot, or `None` when the id is unknown
    fn load(&self, id: Uuid) -> Result<Option<Vec<Message>>>;
}

/// Store that keeps snapshots in memory for the process lifetime
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    saved: Mutex<HashMap<Uuid, SavedConversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved snapshots, newest first
    pub fn list(&self) -> Vec<SavedConversation> {
        let saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<SavedConversation> = saved.values().cloned().collect();
        all.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        all
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn save(&self, name: &str, messages: &[Message], model: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let snapshot = SavedConversation {
            id,
            name: name.to_string(),
            model: model.to_string(),
            saved_at: Utc::now(),
            messages: messages.to_vec(),
        };
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, snapshot);
        tracing::debug!(target: "quill.chat.engine", %id, name, "Saved conversation");
        Ok(id)
    }

    fn load(&self, id: Uuid) -> Result<Option<Vec<Message>>> {
        Ok(self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|s| s.messages.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let store = InMemoryConversationStore::new();
        let messages = vec![Message::user("hi"), Message::assistant("hello")];

        let id = store.save("greeting", &messages, "gpt-4o-mini").unwrap();
        assert_eq!(store.load(id).unwrap(), Some(messages));

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "greeting");
        assert_eq!(listed[0].model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_unknown_id() {
        let store = InMemoryConversationStore::new();
        assert_eq!(store.load(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_snapshots_are_independent() {
        let store = InMemoryConversationStore::new();
        let first = store.save("a", &[Message::user("one")], "m").unwrap();
        let second = store.save("a", &[Message::user("two")], "m").unwrap();
        assert_ne!(first, second);
        assert_eq!(store.load(first).unwrap().unwrap()[0].content, "one");
    }
}
