// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state: the ordered message list and typing indicators.
//!
//! The store is a plain data structure. Shared access, change notification,
//! and locking live in [`SessionState`](crate::state::SessionState).
//!
//! Invariants:
//! - no two entries share an `id`, and no two share an `idempotencyKey`
//! - an entry's `id` changes at most once
//! - order is arrival order

use std::collections::BTreeSet;

use parley_core::{Message, MessageStatus};
use serde_json::Value;

/// Outcome of [`ConversationStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Appended. `cleared_typing` is set when the sender's indicator was switched off.
    Inserted { cleared_typing: bool },
    /// An entry with the same id or idempotency key already exists; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    id_rewritten: bool,
}

impl Entry {
    fn answers_to(&self, identifier: &str) -> bool {
        self.message.id == identifier
            || self.message.idempotency_key.as_deref() == Some(identifier)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConversationStore {
    entries: Vec<Entry>,
    typing: BTreeSet<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an untyped candidate and insert it.
    ///
    /// Returns the stored message, or `None` when the candidate was not an
    /// object or duplicated an existing entry.
    pub fn add(&mut self, candidate: &Value) -> Option<Message> {
        let message = Message::from_value(candidate)?;
        match self.insert(message.clone()) {
            Insertion::Inserted { .. } => Some(message),
            Insertion::Duplicate => None,
        }
    }

    /// Insert a message unless it duplicates an existing one. First write wins.
    pub fn insert(&mut self, message: Message) -> Insertion {
        let duplicate = self.exists_by_key(&message.id)
            || message
                .idempotency_key
                .as_deref()
                .is_some_and(|key| self.exists_by_key(key));
        if duplicate {
            return Insertion::Duplicate;
        }

        let cleared_typing = self.typing.remove(message.sender.participant());
        self.entries.push(Entry {
            message,
            id_rewritten: false,
        });
        Insertion::Inserted { cleared_typing }
    }

    /// Set the status of the entry whose current id is `id`.
    ///
    /// Returns true if something changed. Unknown ids are ignored, and an
    /// acknowledged entry never moves to another status.
    pub fn update_status(&mut self, id: &str, status: MessageStatus) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == id) else {
            return false;
        };
        let current = entry.message.status;
        if current == status || current == MessageStatus::Acknowledged {
            return false;
        }
        entry.message.status = status;
        true
    }

    /// Replace a locally generated id with the backend's.
    ///
    /// Applies once per entry. Ignored when `old_id` is unknown, the entry was
    /// already rewritten, or `new_id` already identifies another entry.
    pub fn rewrite_id(&mut self, old_id: &str, new_id: &str) -> bool {
        if old_id == new_id {
            return false;
        }
        let Some(index) = self.entries.iter().position(|e| e.message.id == old_id) else {
            return false;
        };
        if self.entries[index].id_rewritten {
            return false;
        }
        let taken = self
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| i != index && e.answers_to(new_id));
        if taken {
            return false;
        }

        let entry = &mut self.entries[index];
        entry.message.id = new_id.to_string();
        entry.id_rewritten = true;
        true
    }

    /// True if any entry's id or idempotency key equals `identifier`.
    pub fn exists_by_key(&self, identifier: &str) -> bool {
        self.entries.iter().any(|e| e.answers_to(identifier))
    }

    /// The entry whose id or idempotency key equals `identifier`.
    pub fn find_by_key(&self, identifier: &str) -> Option<&Message> {
        self.entries
            .iter()
            .find(|e| e.answers_to(identifier))
            .map(|e| &e.message)
    }

    /// Record whether `participant` is typing. Returns true if the indicator changed.
    pub fn set_typing(&mut self, participant: &str, typing: bool) -> bool {
        if typing {
            self.typing.insert(participant.to_string())
        } else {
            self.typing.remove(participant)
        }
    }

    pub fn is_typing(&self, participant: &str) -> bool {
        self.typing.contains(participant)
    }

    /// Participants currently typing, sorted.
    pub fn typing(&self) -> Vec<String> {
        self.typing.iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole sequence with a backend-supplied history.
    ///
    /// Duplicates within `history` are dropped the same way inserts are.
    /// Returns the number of entries kept.
    pub fn replace(&mut self, history: Vec<Message>) -> usize {
        self.entries.clear();
        for message in history {
            if !self.exists_by_key(&message.id)
                && !message
                    .idempotency_key
                    .as_deref()
                    .is_some_and(|k| self.exists_by_key(k))
            {
                self.entries.push(Entry {
                    message,
                    id_rewritten: false,
                });
            }
        }
        self.entries.len()
    }

    /// Drop all messages and typing indicators.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.typing.clear();
    }
}
