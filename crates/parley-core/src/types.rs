// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Parley workspace.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids;

/// Who authored a message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Participant identifier used by typing indicators.
    pub fn participant(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// Delivery status of a message.
///
/// `Acknowledged` is terminal: once the backend has confirmed a message no
/// later update can move it back.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Authored locally, handed to a transport.
    Sent,
    /// Confirmed by the backend.
    Acknowledged,
    /// Arrived from the backend.
    Received,
    /// Every transport failed; eligible for retry.
    Failed,
}

/// A single conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// A locally authored message awaiting delivery.
    pub fn outgoing(id: String, idempotency_key: String, text: impl Into<String>) -> Self {
        Self {
            id,
            idempotency_key: Some(idempotency_key),
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    /// Normalize an untyped inbound candidate into a `Message`.
    ///
    /// Returns `None` for anything that is not a JSON object. Missing fields
    /// are defaulted: a generated id, sender `assistant`, status `received`,
    /// timestamp now. Text is taken from `text`, falling back to a string
    /// `message` field.
    pub fn from_value(candidate: &Value) -> Option<Self> {
        let obj = candidate.as_object()?;

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => ids::generate("inbound"),
        };

        let idempotency_key = obj
            .get("idempotencyKey")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let sender = obj
            .get("sender")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Sender::Assistant);

        let text = obj
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| obj.get("message").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let timestamp = obj
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(MessageStatus::Received);

        Some(Self {
            id,
            idempotency_key,
            sender,
            text,
            timestamp,
            status,
        })
    }
}

/// Accepts RFC 3339 strings, zone-less ISO datetimes (taken as UTC), or
/// epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Response of the fallback send endpoint.
///
/// `id` is the server-assigned id for the user's message. The assistant's
/// reply reuses `reply_id` when the backend supplies one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reply_id: Option<String>,
}

impl SendReceipt {
    /// Lenient decoding of a receipt body.
    ///
    /// The id may be a non-empty string or a number. The timestamp follows
    /// the same rules as inbound messages but stays `None` when absent or
    /// unreadable. Returns `None` without a usable id.
    pub fn from_value(candidate: &Value) -> Option<Self> {
        let obj = candidate.as_object()?;

        let id = match obj.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let text = obj
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| obj.get("message").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let reply_id = match obj.get("replyId") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Some(Self {
            id,
            text,
            timestamp: obj.get("timestamp").and_then(parse_timestamp),
            reply_id,
        })
    }
}
