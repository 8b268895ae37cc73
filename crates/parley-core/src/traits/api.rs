// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response API used as the fallback transport and for account operations.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::ParleyError;
use crate::types::{Message, SendReceipt};

/// Request/response backend API.
///
/// Implementations read the current credential at call time so that an
/// in-band refresh applies to the next request without reconstruction.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Delivers one user message. The idempotency key lets the backend drop replays.
    async fn send_message(
        &self,
        text: &str,
        idempotency_key: &str,
    ) -> Result<SendReceipt, ParleyError>;

    /// Fetches the full conversation history in backend order.
    async fn history(&self) -> Result<Vec<Message>, ParleyError>;

    /// Exchanges user credentials for a bearer token.
    async fn login(
        &self,
        user_name: &str,
        password: &SecretString,
    ) -> Result<SecretString, ParleyError>;

    /// Invalidates the current token on the backend.
    async fn logout(&self) -> Result<(), ParleyError>;
}
