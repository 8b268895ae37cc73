// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley delivery client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to a local development setup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Deployment environment and logging.
    #[serde(default)]
    pub client: ClientConfig,

    /// Persistent socket channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Request/response API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Durable credential storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the client runs. Selects the socket endpoint strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local backend on fixed ports.
    #[default]
    Development,
    /// Endpoint derived from `client.origin`.
    Production,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Origin the client is served from (scheme and host). The production
    /// socket endpoint is derived from it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            origin: default_origin(),
            log_level: default_log_level(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Socket channel lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Explicit `ws://` or `wss://` endpoint. Overrides environment-based resolution.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// How long an open attempt may stay in CONNECTING before it is aborted.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Delay before the first reconnection attempt; doubles per attempt.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Upper bound on the reconnection delay.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Consecutive failed attempts before reconnection is abandoned.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Safety window for acknowledging an in-band credential refresh.
    #[serde(default = "default_token_ack_timeout_secs")]
    pub token_ack_timeout_secs: u64,
}

impl ChannelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn token_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.token_ack_timeout_secs)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            token_ack_timeout_secs: default_token_ack_timeout_secs(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_token_ack_timeout_secs() -> u64 {
    120
}

/// Request/response API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL that endpoint paths such as `/chat/message` are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Credential storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the credential file.
    #[serde(default = "default_credential_path")]
    pub credential_path: String,

    /// Key the bearer token is stored under.
    #[serde(default = "default_credential_key")]
    pub credential_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
            credential_key: default_credential_key(),
        }
    }
}

fn default_credential_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("parley").join("credentials.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley-credentials.json"))
        .display()
        .to_string()
}

fn default_credential_key() -> String {
    "token".to_string()
}
