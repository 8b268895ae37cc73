// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock fallback API for deterministic testing.
//!
//! `MockApi` implements `ChatApi` with a FIFO of scripted send replies. When
//! the queue is empty, sends succeed with a generated receipt that echoes the
//! text back as the assistant's reply.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::{ChatApi, Message, ParleyError, SendReceipt};
use secrecy::SecretString;
use tokio::sync::Mutex;

/// Scripted outcome of one `send_message` call.
#[derive(Debug, Clone)]
pub enum ApiReply {
    Receipt(SendReceipt),
    /// A non-auth failure with this message.
    Fail(String),
    /// HTTP 401.
    Unauthorized,
}

/// A scripted fallback API that records every call.
pub struct MockApi {
    replies: Mutex<VecDeque<ApiReply>>,
    history: Mutex<Result<Vec<Message>, ApiReply>>,
    sends: Mutex<Vec<(String, String)>>,
    logins: Mutex<Vec<String>>,
    login_token: String,
    send_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockApi {
    /// Create a mock API with an empty script and empty history.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            history: Mutex::new(Ok(Vec::new())),
            sends: Mutex::new(Vec::new()),
            logins: Mutex::new(Vec::new()),
            login_token: "mock-token".to_string(),
            send_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock API pre-loaded with send replies.
    pub fn with_replies(replies: Vec<ApiReply>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            ..Self::new()
        }
    }

    /// Add a send reply to the end of the queue.
    pub async fn push_reply(&self, reply: ApiReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Set what `history` returns.
    pub async fn set_history(&self, history: Vec<Message>) {
        *self.history.lock().await = Ok(history);
    }

    /// Make `history` fail with `reply`'s error.
    pub async fn fail_history(&self, reply: ApiReply) {
        *self.history.lock().await = Err(reply);
    }

    /// Number of `send_message` calls.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// `(text, idempotency_key)` for every send, in order.
    pub async fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().await.clone()
    }

    /// User names passed to `login`.
    pub async fn logins(&self) -> Vec<String> {
        self.logins.lock().await.clone()
    }

    /// The token `login` hands out.
    pub fn login_token(&self) -> &str {
        &self.login_token
    }

    fn error_for(reply: ApiReply) -> ParleyError {
        match reply {
            ApiReply::Unauthorized => ParleyError::Unauthorized {
                message: "token expired".into(),
            },
            ApiReply::Fail(message) => ParleyError::Api {
                message,
                status: Some(500),
                source: None,
            },
            ApiReply::Receipt(_) => ParleyError::Internal("receipt scripted as an error".into()),
        }
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn send_message(
        &self,
        text: &str,
        idempotency_key: &str,
    ) -> Result<SendReceipt, ParleyError> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sends
            .lock()
            .await
            .push((text.to_string(), idempotency_key.to_string()));

        match self.replies.lock().await.pop_front() {
            Some(ApiReply::Receipt(receipt)) => Ok(receipt),
            Some(other) => Err(Self::error_for(other)),
            None => Ok(SendReceipt {
                id: format!("srv_{n}"),
                text: format!("echo: {text}"),
                timestamp: Some(chrono::Utc::now()),
                reply_id: Some(format!("reply_srv_{n}")),
            }),
        }
    }

    async fn history(&self) -> Result<Vec<Message>, ParleyError> {
        match &*self.history.lock().await {
            Ok(history) => Ok(history.clone()),
            Err(reply) => Err(Self::error_for(reply.clone())),
        }
    }

    async fn login(
        &self,
        user_name: &str,
        _password: &SecretString,
    ) -> Result<SecretString, ParleyError> {
        self.logins.lock().await.push(user_name.to_string());
        Ok(SecretString::from(self.login_token.clone()))
    }

    async fn logout(&self) -> Result<(), ParleyError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
