// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Socket transport seam used by the channel actor.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::error::ParleyError;

/// Close code for a normal, expected closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// One unit on the wire, reduced to what the client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// A text frame.
    Text(String),
    /// A close frame with its status code, if the peer sent one.
    Close(Option<u16>),
}

/// Outbound half of an open socket.
pub type WireSink = Pin<Box<dyn Sink<WireMessage, Error = ParleyError> + Send>>;

/// Inbound half of an open socket. Ends when the connection is gone.
pub type WireStream = Pin<Box<dyn Stream<Item = WireMessage> + Send>>;

/// Opens socket connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`, resolving once the handshake completes.
    async fn connect(&self, url: &str) -> Result<(WireSink, WireStream), ParleyError>;
}
