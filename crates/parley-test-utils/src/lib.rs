// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and a test harness for fast, deterministic tests
//! without a live backend.
//!
//! # Components
//!
//! - [`MockConnector`] - Scripted socket connections with frame injection and capture
//! - [`MockApi`] - Scripted fallback API with call recording
//! - [`TestHarness`] - A [`ChatClient`](parley_client::ChatClient) wired to both mocks

pub mod harness;
pub mod mock_api;
pub mod mock_connector;

pub use harness::{settle, TestHarness};
pub use mock_api::{ApiReply, MockApi};
pub use mock_connector::{ConnectBehavior, MockConnector, MockSocket};
