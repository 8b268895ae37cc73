// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end client testing.
//!
//! `TestHarness` assembles a complete [`ChatClient`] over a [`MockConnector`],
//! a [`MockApi`], and an in-memory credential store. Tests are expected to
//! run on a paused clock (`#[tokio::test(start_paused = true)]`), where
//! [`settle`] lets every spawned task run to idle.

use std::sync::Arc;
use std::time::Duration;

use parley_client::{ChannelSettings, ChatClient, SessionEvent, SessionState};
use parley_core::CredentialStore;
use parley_storage::MemoryCredentialStore;
use tokio::sync::broadcast;

use crate::mock_api::MockApi;
use crate::mock_connector::{MockConnector, MockSocket};

/// Endpoint handed to the mock connector.
pub const MOCK_ENDPOINT: &str = "ws://mock.parley.test/ws";

/// Credential storage key used by the harness.
pub const CREDENTIAL_KEY: &str = "token";

/// Let spawned tasks run until they are all waiting on something.
///
/// On a paused clock the runtime advances time only when idle, so a short
/// sleep returns once queued work has drained.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    settings: ChannelSettings,
    token: Option<String>,
    connector: MockConnector,
    api: MockApi,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            settings: ChannelSettings::with_endpoint(MOCK_ENDPOINT),
            token: Some("t1".to_string()),
            connector: MockConnector::new(),
            api: MockApi::new(),
        }
    }

    /// Stored credential at startup. Defaults to `t1`.
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    pub fn with_connector(mut self, connector: MockConnector) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_api(mut self, api: MockApi) -> Self {
        self.api = api;
        self
    }

    /// Adjust channel timings.
    pub fn with_settings(mut self, f: impl FnOnce(&mut ChannelSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    /// Build the harness. Must be called inside a Tokio runtime.
    pub fn build(self) -> TestHarness {
        let store = Arc::new(match &self.token {
            Some(token) => MemoryCredentialStore::with_value(CREDENTIAL_KEY, token),
            None => MemoryCredentialStore::new(),
        });
        let state = Arc::new(SessionState::new(store.clone(), CREDENTIAL_KEY));
        let connector = Arc::new(self.connector);
        let api = Arc::new(self.api);
        let client = ChatClient::from_parts(self.settings, state, connector.clone(), api.clone());

        TestHarness {
            client,
            connector,
            api,
            store,
        }
    }
}

/// A complete client over mock transports.
pub struct TestHarness {
    /// The client under test.
    pub client: ChatClient,
    /// The socket side.
    pub connector: Arc<MockConnector>,
    /// The fallback API side.
    pub api: Arc<MockApi>,
    /// Durable credential storage.
    pub store: Arc<MemoryCredentialStore>,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Default harness: stored token `t1`, accepting connector, echoing API.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        self.client.state()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.subscribe()
    }

    /// Connect and return the socket once the channel reports open.
    pub async fn open(&self) -> MockSocket {
        let index = self.connector.socket_count();
        self.client.connect().expect("channel actor running");
        let socket = self.connector.wait_for_socket(index).await;
        self.client
            .channel()
            .wait_for(|s| s.state.is_open())
            .await
            .expect("channel actor running");
        socket
    }

    /// Stored credential as plain text.
    pub fn stored_token(&self) -> Option<String> {
        use secrecy::ExposeSecret;
        self.store
            .load(CREDENTIAL_KEY)
            .expect("memory store never fails")
            .map(|t| t.expose_secret().to_string())
    }

    /// In-memory credential as plain text.
    pub fn live_token(&self) -> Option<String> {
        use secrecy::ExposeSecret;
        self.state()
            .credential()
            .map(|t| t.expose_secret().to_string())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
