// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session protocol: reacts to inbound frames on an open channel.
//!
//! Conversation updates (chat, status, typing) go straight to the shared
//! [`SessionState`]. Anything that touches the socket or the timers comes
//! back as a [`ProtocolAction`] for the channel actor to perform.
//!
//! Credential refresh: on `TOKEN_REFRESH` the new token is stored, the ack
//! safety timer is armed, and `TOKEN_REFRESH_ACK` is sent at once. A
//! successful send disarms the timer. If the timer fires with the ack still
//! unsent, it is resent once; a second failure surfaces a `token_ack` error.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::frame::{self, InboundFrame};
use crate::state::{ErrorKind, SessionState, VisibleError};

const AUTH_FAILED_MESSAGE: &str = "WebSocket authentication failed";
const SESSION_EXPIRED_MARKER: &str = "Session expired";
const ACK_FAILED_MESSAGE: &str = "Failed to acknowledge credential refresh";

/// Work the protocol needs the channel actor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolAction {
    /// Send `TOKEN_REFRESH_ACK` and report the outcome via [`SessionProtocol::on_ack_sent`].
    SendAck,
    ArmAckTimer,
    DisarmAckTimer,
    /// The server accepted (`true`) or rejected our AUTH.
    AuthChanged(bool),
    /// The server ended the session: disconnect and forget it.
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Idle,
    Pending { resent: bool },
}

#[derive(Debug)]
pub struct SessionProtocol {
    state: Arc<SessionState>,
    ack: AckState,
}

impl SessionProtocol {
    pub fn new(state: Arc<SessionState>) -> Self {
        Self {
            state,
            ack: AckState::Idle,
        }
    }

    /// Whether a credential refresh is still waiting for its ack to go out.
    pub fn ack_pending(&self) -> bool {
        matches!(self.ack, AckState::Pending { .. })
    }

    /// Forget any in-flight ack. Called when the channel is torn down.
    pub fn reset(&mut self) {
        self.ack = AckState::Idle;
    }

    /// Parse and dispatch one raw text frame. Malformed frames are logged and dropped.
    pub fn on_text(&mut self, raw: &str) -> Vec<ProtocolAction> {
        match frame::parse(raw) {
            Ok(frame) => self.on_frame(frame),
            Err(e) => {
                warn!(error = %e, "dropping inbound frame");
                Vec::new()
            }
        }
    }

    pub fn on_frame(&mut self, frame: InboundFrame) -> Vec<ProtocolAction> {
        match frame {
            InboundFrame::Bare(candidate) | InboundFrame::Chat(candidate) => {
                self.state.add_message(&candidate);
                Vec::new()
            }
            InboundFrame::StatusUpdate { message_id, status } => {
                if !self.state.update_status(&message_id, status) {
                    debug!(%message_id, %status, "status update not applied");
                }
                Vec::new()
            }
            InboundFrame::Typing {
                participant,
                typing,
            } => {
                self.state.set_typing(&participant, typing);
                Vec::new()
            }
            InboundFrame::AuthSuccess => {
                info!("channel authenticated");
                vec![ProtocolAction::AuthChanged(true)]
            }
            InboundFrame::AuthFailed { message } => {
                warn!(reason = message.as_deref().unwrap_or("unspecified"), "channel authentication failed");
                self.state.raise_error(VisibleError::new(
                    ErrorKind::Authentication,
                    AUTH_FAILED_MESSAGE,
                ));
                vec![ProtocolAction::AuthChanged(false)]
            }
            InboundFrame::TokenRefresh { token } => self.on_token_refresh(token),
            InboundFrame::System { payload } => match payload {
                Some(text) if text.contains(SESSION_EXPIRED_MARKER) => {
                    warn!(%text, "server expired the session");
                    self.ack = AckState::Idle;
                    vec![ProtocolAction::DisarmAckTimer, ProtocolAction::Teardown]
                }
                other => {
                    info!(payload = other.as_deref().unwrap_or(""), "system message");
                    Vec::new()
                }
            },
            InboundFrame::ServerError { message } => {
                self.state
                    .raise_error(VisibleError::new(ErrorKind::Server, message));
                Vec::new()
            }
            InboundFrame::Unknown(kind) => {
                debug!(%kind, "ignoring unknown frame type");
                Vec::new()
            }
        }
    }

    fn on_token_refresh(&mut self, token: String) -> Vec<ProtocolAction> {
        info!("credential refreshed by server");
        if let Err(e) = self.state.set_credential(Some(SecretString::from(token))) {
            warn!(error = %e, "refreshed credential not persisted");
        }
        self.ack = AckState::Pending { resent: false };
        vec![ProtocolAction::ArmAckTimer, ProtocolAction::SendAck]
    }

    /// Outcome of a [`ProtocolAction::SendAck`].
    pub fn on_ack_sent(&mut self, sent: bool) -> Vec<ProtocolAction> {
        match (self.ack, sent) {
            (AckState::Idle, _) => Vec::new(),
            (AckState::Pending { .. }, true) => {
                debug!("credential refresh acknowledged");
                self.ack = AckState::Idle;
                vec![ProtocolAction::DisarmAckTimer]
            }
            (AckState::Pending { resent: false }, false) => {
                warn!("credential refresh ack not sent, waiting for safety timer");
                Vec::new()
            }
            (AckState::Pending { resent: true }, false) => {
                self.ack = AckState::Idle;
                self.state
                    .raise_error(VisibleError::new(ErrorKind::TokenAck, ACK_FAILED_MESSAGE));
                Vec::new()
            }
        }
    }

    /// The ack safety timer fired.
    pub fn on_ack_timer(&mut self) -> Vec<ProtocolAction> {
        match self.ack {
            AckState::Pending { resent: false } => {
                info!("resending credential refresh ack");
                self.ack = AckState::Pending { resent: true };
                vec![ProtocolAction::SendAck]
            }
            AckState::Pending { resent: true } | AckState::Idle => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{CredentialStore, MessageStatus};
    use parley_storage::MemoryCredentialStore;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use tracing_test::traced_test;

    fn protocol() -> (Arc<MemoryCredentialStore>, Arc<SessionState>, SessionProtocol) {
        let store = Arc::new(MemoryCredentialStore::with_value("token", "t1"));
        let state = Arc::new(SessionState::new(store.clone(), "token"));
        let protocol = SessionProtocol::new(state.clone());
        (store, state, protocol)
    }

    #[test]
    fn chat_frames_reach_the_store_once() {
        let (_, state, mut p) = protocol();
        let raw = json!({"type": "CHAT_MESSAGE", "payload": {"id": "m1", "text": "hi"}}).to_string();
        assert!(p.on_text(&raw).is_empty());
        p.on_text(&raw);
        p.on_text(r#"{"id":"m1","text":"bare duplicate"}"#);
        let messages = state.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");
    }

    #[traced_test]
    #[test]
    fn malformed_frames_are_dropped() {
        let (_, state, mut p) = protocol();
        assert!(p.on_text("not json").is_empty());
        assert!(p.on_text(r#"{"type":"TOKEN_REFRESH"}"#).is_empty());
        assert!(state.messages().is_empty());
        assert!(state.error().is_none());
        assert!(logs_contain("dropping inbound frame"));
        assert!(logs_contain("TOKEN_REFRESH without payload"));
    }

    #[test]
    fn status_and_typing_frames_update_state() {
        let (_, state, mut p) = protocol();
        p.on_text(r#"{"type":"CHAT_MESSAGE","id":"m1","text":"x","sender":"user","status":"sent"}"#);
        p.on_text(r#"{"type":"MESSAGE_STATUS_UPDATE","messageId":"m1","status":"acknowledged"}"#);
        assert_eq!(state.find_by_key("m1").unwrap().status, MessageStatus::Acknowledged);

        p.on_text(r#"{"type":"TYPING_START"}"#);
        assert!(state.is_typing("assistant"));
        p.on_text(r#"{"type":"TYPING_STOP","userId":"assistant"}"#);
        assert!(!state.is_typing("assistant"));
    }

    #[test]
    fn auth_failure_is_visible_but_keeps_channel() {
        let (_, state, mut p) = protocol();
        let actions = p.on_text(r#"{"type":"AUTH_FAILED","message":"bad token"}"#);
        assert_eq!(actions, [ProtocolAction::AuthChanged(false)]);
        let err = state.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.message, AUTH_FAILED_MESSAGE);
        assert!(!err.fatal);

        assert_eq!(
            p.on_text(r#"{"type":"AUTH_SUCCESS"}"#),
            [ProtocolAction::AuthChanged(true)]
        );
    }

    #[test]
    fn server_errors_never_enter_the_conversation() {
        let (_, state, mut p) = protocol();
        p.on_text(r#"{"type":"ERROR_MESSAGE","payload":"rate limited"}"#);
        assert_eq!(state.error().unwrap().message, "rate limited");
        p.on_text(r#"{"type":"ERROR","message":"legacy"}"#);
        assert_eq!(state.error().unwrap().kind, ErrorKind::Server);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn token_refresh_stores_and_acks() {
        let (store, state, mut p) = protocol();
        let actions = p.on_text(r#"{"type":"TOKEN_REFRESH","payload":"t2"}"#);
        assert_eq!(actions, [ProtocolAction::ArmAckTimer, ProtocolAction::SendAck]);
        assert_eq!(state.credential().unwrap().expose_secret(), "t2");
        assert_eq!(store.load("token").unwrap().unwrap().expose_secret(), "t2");
        assert!(p.ack_pending());

        assert_eq!(p.on_ack_sent(true), [ProtocolAction::DisarmAckTimer]);
        assert!(!p.ack_pending());
        assert!(p.on_ack_timer().is_empty());
    }

    #[test]
    fn unsent_ack_is_resent_once_then_escalated() {
        let (_, state, mut p) = protocol();
        p.on_text(r#"{"type":"TOKEN_REFRESH","payload":"t2"}"#);
        assert!(p.on_ack_sent(false).is_empty());
        assert!(state.error().is_none());

        assert_eq!(p.on_ack_timer(), [ProtocolAction::SendAck]);
        assert!(p.on_ack_sent(false).is_empty());
        assert_eq!(state.error().unwrap().kind, ErrorKind::TokenAck);
        assert!(!p.ack_pending());
        assert!(p.on_ack_timer().is_empty());
    }

    #[test]
    fn resend_success_clears_pending() {
        let (_, state, mut p) = protocol();
        p.on_text(r#"{"type":"TOKEN_REFRESH","payload":"t2"}"#);
        p.on_ack_sent(false);
        p.on_ack_timer();
        assert_eq!(p.on_ack_sent(true), [ProtocolAction::DisarmAckTimer]);
        assert!(state.error().is_none());
    }

    #[test]
    fn session_expiry_requests_teardown() {
        let (_, _, mut p) = protocol();
        p.on_text(r#"{"type":"TOKEN_REFRESH","payload":"t2"}"#);
        let actions =
            p.on_text(r#"{"type":"SYSTEM_MESSAGE","payload":"Session expired, please log in"}"#);
        assert_eq!(
            actions,
            [ProtocolAction::DisarmAckTimer, ProtocolAction::Teardown]
        );
        assert!(!p.ack_pending());

        assert!(p
            .on_text(r#"{"type":"SYSTEM_MESSAGE","payload":"maintenance at noon"}"#)
            .is_empty());
    }

    #[test]
    fn unknown_types_are_ignored() {
        let (_, state, mut p) = protocol();
        assert!(p.on_text(r#"{"type":"PRESENCE","userId":"x"}"#).is_empty());
        assert!(state.messages().is_empty());
    }
}
