// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON control frames exchanged over the socket channel.
//!
//! Every frame is an object with a `type` discriminator. Inbound parsing is
//! lenient: a frame without a usable `type` is treated as a bare chat payload,
//! and `CHAT_MESSAGE` frames are unwrapped through [`ENVELOPE_STRATEGIES`]
//! because the backend has shipped several envelope shapes.

use parley_core::{MessageStatus, ParleyError};
use serde::Serialize;
use serde_json::Value;

/// Frames the client sends.
#[derive(Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundFrame {
    Auth {
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    ChatMessage {
        message: String,
        #[serde(rename = "idempotencyKey")]
        idempotency_key: String,
    },
    TokenRefreshAck {
        /// Epoch milliseconds.
        timestamp: i64,
    },
    TypingStart,
    TypingStop,
}

impl OutboundFrame {
    /// Wire name of the frame, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Auth { .. } => "AUTH",
            OutboundFrame::ChatMessage { .. } => "CHAT_MESSAGE",
            OutboundFrame::TokenRefreshAck { .. } => "TOKEN_REFRESH_ACK",
            OutboundFrame::TypingStart => "TYPING_START",
            OutboundFrame::TypingStop => "TYPING_STOP",
        }
    }

    pub fn typing(typing: bool) -> Self {
        if typing {
            OutboundFrame::TypingStart
        } else {
            OutboundFrame::TypingStop
        }
    }

    pub fn token_refresh_ack() -> Self {
        OutboundFrame::TokenRefreshAck {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, ParleyError> {
        serde_json::to_string(self)
            .map_err(|e| ParleyError::Protocol(format!("failed to encode {}: {e}", self.kind())))
    }
}

// Hand-written so the AUTH token never reaches a log line.
impl std::fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboundFrame::Auth { token } => f
                .debug_struct("Auth")
                .field("token", &token.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            OutboundFrame::ChatMessage {
                idempotency_key, ..
            } => f
                .debug_struct("ChatMessage")
                .field("idempotency_key", idempotency_key)
                .finish_non_exhaustive(),
            OutboundFrame::TokenRefreshAck { timestamp } => f
                .debug_struct("TokenRefreshAck")
                .field("timestamp", timestamp)
                .finish(),
            OutboundFrame::TypingStart => f.write_str("TypingStart"),
            OutboundFrame::TypingStop => f.write_str("TypingStop"),
        }
    }
}

/// Frames the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// No `type`: the whole frame is a chat message candidate.
    Bare(Value),
    AuthSuccess,
    AuthFailed { message: Option<String> },
    /// `CHAT_MESSAGE`, already unwrapped from its envelope.
    Chat(Value),
    StatusUpdate { message_id: String, status: MessageStatus },
    Typing { participant: String, typing: bool },
    System { payload: Option<String> },
    TokenRefresh { token: String },
    /// `ERROR_MESSAGE{payload}` or legacy `ERROR{message}`.
    ServerError { message: String },
    Unknown(String),
}

/// An envelope extraction strategy: returns the candidate if the frame has this shape.
pub type EnvelopeStrategy = fn(&Value) -> Option<&Value>;

/// `CHAT_MESSAGE` envelope shapes, tried in order. The last always matches.
pub const ENVELOPE_STRATEGIES: &[(&str, EnvelopeStrategy)] = &[
    ("payload", payload_object),
    ("message", message_object),
    ("text", text_shaped),
    ("raw", raw_frame),
];

fn payload_object(frame: &Value) -> Option<&Value> {
    frame.get("payload").filter(|v| v.is_object())
}

fn message_object(frame: &Value) -> Option<&Value> {
    frame.get("message").filter(|v| v.is_object())
}

fn text_shaped(frame: &Value) -> Option<&Value> {
    frame.get("text").map(|_| frame)
}

fn raw_frame(frame: &Value) -> Option<&Value> {
    Some(frame)
}

/// Pick the chat candidate out of a `CHAT_MESSAGE` frame.
pub fn unwrap_envelope(frame: &Value) -> &Value {
    ENVELOPE_STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(frame))
        .unwrap_or(frame)
}

/// JavaScript-style truthiness, used for the `type` presence check.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_field(frame: &Value, name: &str) -> Option<String> {
    frame.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Parse a raw text frame.
///
/// Returns [`ParleyError::Protocol`] for malformed JSON and for control
/// frames missing the fields they need. Unknown types are not an error.
pub fn parse(raw: &str) -> Result<InboundFrame, ParleyError> {
    let frame: Value = serde_json::from_str(raw)
        .map_err(|e| ParleyError::Protocol(format!("malformed frame: {e}")))?;

    if !frame.get("type").is_some_and(truthy) {
        return Ok(InboundFrame::Bare(frame));
    }
    let kind = &frame["type"];
    let Some(kind) = kind.as_str() else {
        return Ok(InboundFrame::Unknown(kind.to_string()));
    };

    let parsed = match kind {
        "AUTH_SUCCESS" => InboundFrame::AuthSuccess,
        "AUTH_FAILED" => InboundFrame::AuthFailed {
            message: string_field(&frame, "message"),
        },
        "CHAT_MESSAGE" => InboundFrame::Chat(unwrap_envelope(&frame).clone()),
        "MESSAGE_STATUS_UPDATE" => {
            let message_id = match frame.get("messageId") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(ParleyError::Protocol(
                        "MESSAGE_STATUS_UPDATE without messageId".into(),
                    ));
                }
            };
            let status = frame
                .get("status")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    ParleyError::Protocol(format!("MESSAGE_STATUS_UPDATE for {message_id} has no valid status"))
                })?;
            InboundFrame::StatusUpdate { message_id, status }
        }
        "TYPING_START" | "TYPING_STOP" => InboundFrame::Typing {
            participant: string_field(&frame, "userId")
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "assistant".to_string()),
            typing: kind == "TYPING_START",
        },
        "SYSTEM_MESSAGE" => InboundFrame::System {
            payload: string_field(&frame, "payload"),
        },
        "TOKEN_REFRESH" => {
            let token = string_field(&frame, "payload")
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ParleyError::Protocol("TOKEN_REFRESH without payload".into()))?;
            InboundFrame::TokenRefresh { token }
        }
        "ERROR_MESSAGE" => InboundFrame::ServerError {
            message: string_field(&frame, "payload").unwrap_or_else(|| "Server error".into()),
        },
        "ERROR" => InboundFrame::ServerError {
            message: string_field(&frame, "message").unwrap_or_else(|| "Server error".into()),
        },
        other => InboundFrame::Unknown(other.to_string()),
    };
    Ok(parsed)
}
