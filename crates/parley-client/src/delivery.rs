// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message delivery.
//!
//! A send is optimistic: the message is in the conversation before any
//! network I/O. The socket channel is tried first; if it is down or the write
//! fails, the request/response API takes over. Every send carries an
//! idempotency key so that the backend, and the local store, can drop replays.

use std::sync::Arc;

use chrono::Utc;
use parley_core::{ids, ChatApi, Message, MessageStatus, ParleyError, SendReceipt, Sender};
use tracing::{debug, info, warn};

use crate::channel::ChannelHandle;
use crate::frame::OutboundFrame;
use crate::state::{ErrorKind, SessionState, VisibleError};

#[derive(Clone)]
pub struct DeliveryOrchestrator {
    state: Arc<SessionState>,
    channel: ChannelHandle,
    api: Arc<dyn ChatApi>,
}

impl DeliveryOrchestrator {
    pub fn new(state: Arc<SessionState>, channel: ChannelHandle, api: Arc<dyn ChatApi>) -> Self {
        Self {
            state,
            channel,
            api,
        }
    }

    /// Send a new user message.
    ///
    /// Returns the stored message as it stands after delivery. On failure the
    /// message stays in the conversation marked `failed` and can be retried
    /// with its idempotency key.
    pub async fn send(&self, text: &str) -> Result<Message, ParleyError> {
        let key = ids::generate("msg");
        let message = Message::outgoing(ids::generate("local"), key.clone(), text);
        debug!(%key, id = %message.id, "queued outgoing message");
        self.state.insert_message(message);
        self.deliver(&key, text).await
    }

    /// Deliver again under an existing idempotency key.
    ///
    /// An acknowledged message is returned untouched with no network call.
    /// Any other known message is reset to `sent` and re-delivered in place.
    /// An unknown key is inserted fresh and delivered.
    pub async fn retry(&self, key: &str, text: &str) -> Result<Message, ParleyError> {
        match self.state.find_by_key(key) {
            Some(existing) if existing.status == MessageStatus::Acknowledged => {
                debug!(%key, "already acknowledged, not resending");
                return Ok(existing);
            }
            Some(existing) => {
                self.state.update_status(&existing.id, MessageStatus::Sent);
            }
            None => {
                let message = Message::outgoing(ids::generate("local"), key.to_string(), text);
                self.state.insert_message(message);
            }
        }
        info!(%key, "retrying delivery");
        self.deliver(key, text).await
    }

    /// Best-effort typing indicator. Dropped when the channel is not open.
    pub async fn send_typing(&self, typing: bool) -> bool {
        if !self.channel.is_connected() {
            return false;
        }
        self.channel.send(OutboundFrame::typing(typing)).await
    }

    async fn deliver(&self, key: &str, text: &str) -> Result<Message, ParleyError> {
        if self.channel.is_connected() {
            let frame = OutboundFrame::ChatMessage {
                message: text.to_string(),
                idempotency_key: key.to_string(),
            };
            if self.channel.send(frame).await {
                self.mark(key, MessageStatus::Sent);
                debug!(%key, "delivered over channel");
                return self.stored(key);
            }
            info!(%key, "channel send failed, falling back to api");
        }

        match self.api.send_message(text, key).await {
            Ok(receipt) => {
                debug!(%key, id = %receipt.id, "delivered over api");
                self.apply_receipt(key, receipt);
                self.stored(key)
            }
            Err(e) => {
                warn!(%key, error = %e, "delivery failed");
                self.mark(key, MessageStatus::Failed);
                if e.is_unauthorized() {
                    self.state.require_authentication();
                }
                self.state.raise_error(VisibleError::new(
                    ErrorKind::Delivery,
                    format!("Failed to send message: {e}"),
                ));
                Err(e)
            }
        }
    }

    fn apply_receipt(&self, key: &str, receipt: SendReceipt) {
        if let Some(current) = self.state.find_by_key(key) {
            self.state
                .update_status(&current.id, MessageStatus::Acknowledged);
            if !self.state.rewrite_id(&current.id, &receipt.id) {
                debug!(%key, id = %receipt.id, "server id not applied");
            }
        }

        if receipt.text.is_empty() {
            debug!(%key, "receipt carried no reply");
            return;
        }
        self.state.insert_message(Message {
            id: receipt.reply_id.unwrap_or_else(|| ids::generate("reply")),
            idempotency_key: None,
            sender: Sender::Assistant,
            text: receipt.text,
            timestamp: receipt.timestamp.unwrap_or_else(Utc::now),
            status: MessageStatus::Received,
        });
    }

    fn mark(&self, key: &str, status: MessageStatus) {
        if let Some(current) = self.state.find_by_key(key) {
            self.state.update_status(&current.id, status);
        }
    }

    fn stored(&self, key: &str) -> Result<Message, ParleyError> {
        self.state
            .find_by_key(key)
            .ok_or_else(|| ParleyError::Internal(format!("message {key} left the conversation")))
    }
}
