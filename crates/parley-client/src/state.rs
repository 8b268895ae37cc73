// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared session state: credential, connectivity flag, latest visible error,
//! and the conversation store.
//!
//! One [`SessionState`] is created per client and handed to the channel actor,
//! the delivery orchestrator, and the HTTP client (as a [`CredentialSource`]).
//! Every mutation takes a short synchronous lock and is announced on a
//! broadcast channel of [`SessionEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use parley_core::{CredentialSource, CredentialStore, Message, MessageStatus, ParleyError};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::store::{ConversationStore, Insertion};

const EVENT_CAPACITY: usize = 256;

/// Category of a user-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Authentication,
    Server,
    Session,
    ReconnectExhausted,
    TokenAck,
    Delivery,
}

/// The latest error shown to the user. Only one is retained at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleError {
    pub kind: ErrorKind,
    pub message: String,
    /// Fatal errors need user action (reconnect, log in again) to recover.
    pub fatal: bool,
}

impl VisibleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: true,
        }
    }
}

/// Change notifications published by [`SessionState`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessageAdded(Message),
    MessageUpdated { id: String, status: MessageStatus },
    MessageIdRewritten { old_id: String, new_id: String },
    TypingChanged { participant: String, typing: bool },
    ConnectionChanged(bool),
    CredentialChanged { present: bool },
    ErrorRaised(VisibleError),
    ErrorCleared,
    HistoryReplaced(usize),
    LoggedOut,
    AuthenticationRequired,
}

pub struct SessionState {
    credential: RwLock<Option<SecretString>>,
    credential_store: Arc<dyn CredentialStore>,
    credential_key: String,
    connected: AtomicBool,
    error: Mutex<Option<VisibleError>>,
    conversation: Mutex<ConversationStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("credential", &self.has_credential())
            .field("connected", &self.is_connected())
            .field("messages", &self.conversation().len())
            .finish_non_exhaustive()
    }
}

impl SessionState {
    /// Create the state, restoring a previously persisted credential.
    ///
    /// An unreadable store is logged and treated as empty.
    pub fn new(credential_store: Arc<dyn CredentialStore>, credential_key: impl Into<String>) -> Self {
        let credential_key = credential_key.into();
        let credential = match credential_store.load(&credential_key) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to load stored credential");
                None
            }
        };
        debug!(restored = credential.is_some(), "session state initialized");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credential: RwLock::new(credential),
            credential_store,
            credential_key,
            connected: AtomicBool::new(false),
            error: Mutex::new(None),
            conversation: Mutex::new(ConversationStore::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn conversation(&self) -> MutexGuard<'_, ConversationStore> {
        self.conversation.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- credential ---

    pub fn credential(&self) -> Option<SecretString> {
        self.credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Replace the credential in memory, then persist it.
    ///
    /// The in-memory value is updated even if persistence fails, so the live
    /// session keeps working; the storage error is returned to the caller.
    pub fn set_credential(&self, credential: Option<SecretString>) -> Result<(), ParleyError> {
        let present = credential.is_some();
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = credential.clone();
        self.emit(SessionEvent::CredentialChanged { present });
        match &credential {
            Some(value) => self.credential_store.save(&self.credential_key, value),
            None => self.credential_store.remove(&self.credential_key),
        }
    }

    // --- connectivity ---

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            self.emit(SessionEvent::ConnectionChanged(connected));
        }
    }

    // --- visible error ---

    pub fn raise_error(&self, error: VisibleError) {
        warn!(kind = %error.kind, fatal = error.fatal, message = %error.message, "visible error");
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.clone());
        self.emit(SessionEvent::ErrorRaised(error));
    }

    pub fn clear_error(&self) {
        let had = self
            .error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if had {
            self.emit(SessionEvent::ErrorCleared);
        }
    }

    pub fn error(&self) -> Option<VisibleError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // --- conversation ---

    /// Normalize and insert an inbound candidate. Returns the stored message.
    pub fn add_message(&self, candidate: &Value) -> Option<Message> {
        let Some(message) = Message::from_value(candidate) else {
            debug!("dropping non-object message candidate");
            return None;
        };
        self.insert_message(message)
    }

    /// Insert a typed message. Returns it when stored, `None` for duplicates.
    pub fn insert_message(&self, message: Message) -> Option<Message> {
        let outcome = self.conversation().insert(message.clone());
        match outcome {
            Insertion::Duplicate => {
                debug!(id = %message.id, "duplicate message ignored");
                None
            }
            Insertion::Inserted { cleared_typing } => {
                if cleared_typing {
                    self.emit(SessionEvent::TypingChanged {
                        participant: message.sender.participant().to_string(),
                        typing: false,
                    });
                }
                self.emit(SessionEvent::MessageAdded(message.clone()));
                Some(message)
            }
        }
    }

    pub fn update_status(&self, id: &str, status: MessageStatus) -> bool {
        let changed = self.conversation().update_status(id, status);
        if changed {
            self.emit(SessionEvent::MessageUpdated {
                id: id.to_string(),
                status,
            });
        }
        changed
    }

    pub fn rewrite_id(&self, old_id: &str, new_id: &str) -> bool {
        let changed = self.conversation().rewrite_id(old_id, new_id);
        if changed {
            self.emit(SessionEvent::MessageIdRewritten {
                old_id: old_id.to_string(),
                new_id: new_id.to_string(),
            });
        }
        changed
    }

    pub fn exists_by_key(&self, identifier: &str) -> bool {
        self.conversation().exists_by_key(identifier)
    }

    pub fn find_by_key(&self, identifier: &str) -> Option<Message> {
        self.conversation().find_by_key(identifier).cloned()
    }

    pub fn set_typing(&self, participant: &str, typing: bool) {
        if self.conversation().set_typing(participant, typing) {
            self.emit(SessionEvent::TypingChanged {
                participant: participant.to_string(),
                typing,
            });
        }
    }

    pub fn is_typing(&self, participant: &str) -> bool {
        self.conversation().is_typing(participant)
    }

    pub fn typing(&self) -> Vec<String> {
        self.conversation().typing()
    }

    /// Snapshot of the conversation in arrival order.
    pub fn messages(&self) -> Vec<Message> {
        self.conversation().messages()
    }

    pub fn replace_history(&self, history: Vec<Message>) -> usize {
        let kept = self.conversation().replace(history);
        self.emit(SessionEvent::HistoryReplaced(kept));
        kept
    }

    // --- session lifecycle ---

    /// Forget the credential and the conversation. Used by logout and by a
    /// server-initiated session termination.
    pub fn end_session(&self) {
        if let Err(e) = self.set_credential(None) {
            warn!(error = %e, "failed to remove stored credential");
        }
        self.conversation().clear();
        self.clear_error();
        self.emit(SessionEvent::LoggedOut);
    }

    /// The backend rejected the credential: drop it and ask for a new login.
    pub fn require_authentication(&self) {
        if let Err(e) = self.set_credential(None) {
            warn!(error = %e, "failed to remove stored credential");
        }
        self.emit(SessionEvent::AuthenticationRequired);
    }
}

impl CredentialSource for SessionState {
    fn current(&self) -> Option<SecretString> {
        self.credential()
    }
}
