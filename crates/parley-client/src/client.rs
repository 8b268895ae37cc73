// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ChatClient`]: the assembled client.

use std::sync::Arc;

use parley_api::HttpChatApi;
use parley_config::ParleyConfig;
use parley_core::{ChatApi, Connector, CredentialStore, Message, ParleyError};
use parley_storage::FileCredentialStore;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::{ChannelDriver, ChannelHandle, ChannelSettings, ChannelStatus, WsConnector};
use crate::delivery::DeliveryOrchestrator;
use crate::state::{SessionEvent, SessionState};

/// A connected-or-connectable conversation with the backend.
///
/// Owns the channel actor task. Must be created inside a Tokio runtime.
pub struct ChatClient {
    state: Arc<SessionState>,
    channel: ChannelHandle,
    delivery: DeliveryOrchestrator,
    api: Arc<dyn ChatApi>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl ChatClient {
    /// Build a client with the file credential store, the HTTP API, and a
    /// real WebSocket connector.
    pub fn new(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(&config.storage.credential_path));
        let state = Arc::new(SessionState::new(store, &config.storage.credential_key));
        let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(&config.api, state.clone())?);
        let settings = ChannelSettings::from_config(config)?;
        info!(endpoint = %settings.endpoint, api = %config.api.base_url, "chat client configured");
        Ok(Self::from_parts(settings, state, Arc::new(WsConnector), api))
    }

    /// Assemble a client from explicit parts. Used by tests and embedders.
    pub fn from_parts(
        settings: ChannelSettings,
        state: Arc<SessionState>,
        connector: Arc<dyn Connector>,
        api: Arc<dyn ChatApi>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (channel, driver) =
            ChannelDriver::spawn(settings, state.clone(), connector, cancel.child_token());
        let delivery = DeliveryOrchestrator::new(state.clone(), channel.clone(), api.clone());
        Self {
            state,
            channel,
            delivery,
            api,
            cancel,
            driver,
        }
    }

    pub fn connect(&self) -> Result<(), ParleyError> {
        self.channel.connect()
    }

    pub async fn disconnect(&self) -> Result<(), ParleyError> {
        self.channel.disconnect().await
    }

    pub async fn send(&self, text: &str) -> Result<Message, ParleyError> {
        self.delivery.send(text).await
    }

    pub async fn retry(&self, key: &str, text: &str) -> Result<Message, ParleyError> {
        self.delivery.retry(key, text).await
    }

    pub async fn send_typing(&self, typing: bool) -> bool {
        self.delivery.send_typing(typing).await
    }

    /// Replace the conversation with the backend's history. Returns the entry count.
    pub async fn fetch_history(&self) -> Result<usize, ParleyError> {
        match self.api.history().await {
            Ok(history) => Ok(self.state.replace_history(history)),
            Err(e) => {
                if e.is_unauthorized() {
                    self.state.require_authentication();
                }
                Err(e)
            }
        }
    }

    /// Exchange user credentials for a token and store it. Does not connect.
    pub async fn authenticate(
        &self,
        user_name: &str,
        password: &SecretString,
    ) -> Result<(), ParleyError> {
        let token = self.api.login(user_name, password).await?;
        self.state.set_credential(Some(token))?;
        self.state.clear_error();
        info!(%user_name, "logged in");
        Ok(())
    }

    /// Log in, then open the channel.
    pub async fn login(&self, user_name: &str, password: &SecretString) -> Result<(), ParleyError> {
        self.authenticate(user_name, password).await?;
        self.connect()
    }

    /// Close the channel, tell the backend (best effort), and forget the session.
    pub async fn logout(&self) -> Result<(), ParleyError> {
        self.disconnect().await?;
        if self.state.has_credential()
            && let Err(e) = self.api.logout().await
        {
            warn!(error = %e, "backend logout failed");
        }
        self.state.end_session();
        info!("logged out");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.messages()
    }

    /// Stop the channel actor and wait for it to close the socket.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.driver.await {
            warn!(error = %e, "channel driver ended abnormally");
        }
    }
}
