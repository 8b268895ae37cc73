// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent socket channel with automatic reconnection.
//!
//! [`machine`] holds the lifecycle rules, [`driver`] runs them against a real
//! (or mock) socket, and [`ChannelHandle`] is what the rest of the client uses.

pub mod backoff;
pub mod driver;
pub mod endpoint;
pub mod machine;
pub mod timer;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use driver::{ChannelDriver, ChannelHandle, ChannelSettings};
pub use machine::{ChannelState, ChannelStatus};
pub use ws::WsConnector;
