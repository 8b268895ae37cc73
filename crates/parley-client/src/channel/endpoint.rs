// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Socket endpoint resolution.

use parley_config::model::{ChannelConfig, ClientConfig, Environment};
use parley_core::ParleyError;
use tokio_tungstenite::tungstenite::http::Uri;

/// Endpoint used in development and for local origins.
pub const LOCAL_ENDPOINT: &str = "ws://localhost:8080/ws";

const SOCKET_PATH: &str = "/ws";

/// Work out which URL the channel connects to.
///
/// An explicit `channel.endpoint` wins. Development builds and `localhost`
/// origins use [`LOCAL_ENDPOINT`]. Anything else connects to `/ws` on the
/// origin's host, upgrading `https` to `wss`.
pub fn resolve(client: &ClientConfig, channel: &ChannelConfig) -> Result<String, ParleyError> {
    if let Some(endpoint) = channel.endpoint.as_deref().filter(|e| !e.is_empty()) {
        return Ok(endpoint.to_string());
    }
    if client.environment == Environment::Development {
        return Ok(LOCAL_ENDPOINT.to_string());
    }
    from_origin(&client.origin)
}

fn from_origin(origin: &str) -> Result<String, ParleyError> {
    let uri: Uri = origin
        .parse()
        .map_err(|e| ParleyError::Config(format!("invalid origin '{origin}': {e}")))?;

    if uri.host() == Some("localhost") {
        return Ok(LOCAL_ENDPOINT.to_string());
    }

    let scheme = match uri.scheme_str() {
        Some("https") => "wss",
        Some("http") => "ws",
        other => {
            return Err(ParleyError::Config(format!(
                "origin '{origin}' has unsupported scheme {other:?}"
            )));
        }
    };
    let authority = uri
        .authority()
        .ok_or_else(|| ParleyError::Config(format!("origin '{origin}' has no host")))?;

    Ok(format!("{scheme}://{authority}{SOCKET_PATH}"))
}
