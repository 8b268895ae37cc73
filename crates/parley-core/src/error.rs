// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley delivery client.

use thiserror::Error;

/// The primary error type used across Parley adapter traits and client operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid endpoint, missing values, bad header material).
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket transport errors (open failure, send failure, abrupt close).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request/response API errors. `status` is the HTTP status when one was received.
    #[error("api error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend rejected the current credential.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Durable credential storage errors (I/O, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A frame or payload violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The channel actor is no longer running.
    #[error("channel closed")]
    ChannelClosed,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Returns true when the backend rejected the credential (HTTP 401 or equivalent).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ParleyError::Unauthorized { .. })
    }

    /// Shorthand for a [`ParleyError::Transport`] without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        ParleyError::Transport {
            message: message.into(),
            source: None,
        }
    }
}

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        ParleyError::Storage {
            source: Box::new(err),
        }
    }
}
