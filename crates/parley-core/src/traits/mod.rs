// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions at the client's I/O seams.
//!
//! Async adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod api;
pub mod credential;
pub mod transport;

// Re-export all traits at the traits module level for convenience.
pub use api::ChatApi;
pub use credential::{CredentialSource, CredentialStore};
pub use transport::{Connector, WireMessage, WireSink, WireStream};
