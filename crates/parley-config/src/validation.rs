// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as URL schemes, positive timings, and ordered backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !has_scheme(&config.client.origin, &["http", "https"]) {
        fail(format!(
            "client.origin `{}` must start with http:// or https://",
            config.client.origin
        ));
    }

    if !has_scheme(&config.api.base_url, &["http", "https"]) {
        fail(format!(
            "api.base_url `{}` must start with http:// or https://",
            config.api.base_url
        ));
    }

    if let Some(endpoint) = &config.channel.endpoint
        && !has_scheme(endpoint, &["ws", "wss"])
    {
        fail(format!(
            "channel.endpoint `{endpoint}` must start with ws:// or wss://"
        ));
    }

    let channel = &config.channel;
    for (name, value) in [
        ("channel.connect_timeout_ms", channel.connect_timeout_ms),
        ("channel.reconnect_base_ms", channel.reconnect_base_ms),
        ("channel.reconnect_max_ms", channel.reconnect_max_ms),
        ("channel.token_ack_timeout_secs", channel.token_ack_timeout_secs),
        ("api.timeout_secs", config.api.timeout_secs),
    ] {
        if value == 0 {
            fail(format!("{name} must be greater than zero"));
        }
    }

    if channel.reconnect_base_ms > channel.reconnect_max_ms {
        fail(format!(
            "channel.reconnect_base_ms ({}) must not exceed channel.reconnect_max_ms ({})",
            channel.reconnect_base_ms, channel.reconnect_max_ms
        ));
    }

    if config.storage.credential_path.trim().is_empty() {
        fail("storage.credential_path must not be empty".to_string());
    }

    if config.storage.credential_key.trim().is_empty() {
        fail("storage.credential_key must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// True when `url` is `<scheme>://<something>` for one of `schemes`.
fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, rest)| schemes.contains(&scheme) && !rest.is_empty())
}
