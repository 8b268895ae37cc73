// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response API client for the Parley delivery client.
//!
//! [`HttpChatApi`] implements [`parley_core::ChatApi`] over HTTP: message
//! delivery when the socket channel is unavailable, history retrieval, and
//! login/logout.

pub mod client;
pub mod wire;

pub use client::HttpChatApi;
