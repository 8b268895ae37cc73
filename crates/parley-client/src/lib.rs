// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilient real-time message delivery for Parley.
//!
//! Keeps a conversation consistent across a persistent WebSocket channel and
//! a request/response fallback:
//! - [`channel`]: connection lifecycle, reconnect backoff, timers
//! - [`protocol`]: in-band control frames (auth, credential refresh, expiry)
//! - [`store`] and [`state`]: deduplicated conversation plus shared session state
//! - [`delivery`]: optimistic sends with channel-then-API fallback
//! - [`client`]: everything wired together as a [`ChatClient`]

pub mod channel;
pub mod client;
pub mod delivery;
pub mod frame;
pub mod protocol;
pub mod state;
pub mod store;

pub use channel::{ChannelHandle, ChannelSettings, ChannelState, ChannelStatus};
pub use client::ChatClient;
pub use delivery::DeliveryOrchestrator;
pub use frame::{InboundFrame, OutboundFrame};
pub use state::{ErrorKind, SessionEvent, SessionState, VisibleError};
