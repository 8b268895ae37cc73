// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the chat backend's request/response API.
//!
//! Provides [`HttpChatApi`] which handles request construction, live bearer
//! authentication, error body decoding, and one retry on transient errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::ApiConfig;
use parley_core::{ChatApi, CredentialSource, Message, ParleyError, SendReceipt};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::wire::{ApiErrorBody, LoginRequest, LoginResponse, SendMessageRequest};

/// HTTP client for the chat backend.
///
/// The bearer token is looked up from the [`CredentialSource`] on every
/// request, so a credential refreshed over the socket applies immediately.
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialSource>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpChatApi {
    /// Creates a client for `config.base_url`.
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ParleyError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Api {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Shortens the transient-error backoff (for testing with wiremock).
    #[cfg(test)]
    fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends a request, retrying once on 429/500/502/503.
    ///
    /// 401 becomes [`ParleyError::Unauthorized`]; other failures carry the
    /// backend's `message` when the error body has one.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ParleyError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, path, "retrying request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let mut request = self.client.request(method.clone(), self.url(path));
            if let Some(token) = self.credentials.current() {
                request = request.bearer_auth(token.expose_secret());
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    ParleyError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    ParleyError::Api {
                        message: format!("HTTP request failed: {e}"),
                        status: None,
                        source: Some(Box::new(e)),
                    }
                }
            })?;

            let status = response.status();
            debug!(status = %status, attempt, path, "api response received");

            if status.is_success() {
                return Ok(response);
            }

            let message = error_message(status, response).await;

            if status == StatusCode::UNAUTHORIZED {
                return Err(ParleyError::Unauthorized { message });
            }

            let error = ParleyError::Api {
                message,
                status: Some(status.as_u16()),
                source: None,
            };
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, "transient error, will retry");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| ParleyError::Api {
            message: format!("request to {path} failed after retries"),
            status: None,
            source: None,
        }))
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ParleyError> {
        let response = self.execute(method, path, body).await?;
        let bytes = response.bytes().await.map_err(|e| ParleyError::Api {
            message: format!("failed to read response body: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ParleyError::Api {
            message: format!("failed to parse response from {path}: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }
}

fn to_body(value: impl serde::Serialize) -> Result<Value, ParleyError> {
    serde_json::to_value(value).map_err(|e| ParleyError::Internal(format!("request encoding: {e}")))
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_message(
        &self,
        text: &str,
        idempotency_key: &str,
    ) -> Result<SendReceipt, ParleyError> {
        let body = to_body(SendMessageRequest {
            message: text,
            idempotency_key,
        })?;
        let value: Value = self
            .execute_json(Method::POST, "/chat/message", Some(&body))
            .await?;
        SendReceipt::from_value(&value)
            .ok_or_else(|| ParleyError::Protocol("send response has no message id".into()))
    }

    async fn history(&self) -> Result<Vec<Message>, ParleyError> {
        let value: Value = self
            .execute_json(Method::GET, "/chat/history", None)
            .await?;

        let entries = match value {
            Value::Array(entries) => entries,
            Value::Object(mut obj) => match obj.remove("messages") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(ParleyError::Protocol(
                        "history response has no message list".into(),
                    ));
                }
            },
            _ => {
                return Err(ParleyError::Protocol(
                    "history response is not a list".into(),
                ));
            }
        };

        let total = entries.len();
        let messages: Vec<Message> = entries.iter().filter_map(Message::from_value).collect();
        if messages.len() < total {
            warn!(
                skipped = total - messages.len(),
                "dropped malformed history entries"
            );
        }
        Ok(messages)
    }

    async fn login(
        &self,
        user_name: &str,
        password: &SecretString,
    ) -> Result<SecretString, ParleyError> {
        let body = to_body(LoginRequest {
            user_name,
            password: password.expose_secret(),
        })?;
        let response: LoginResponse = self
            .execute_json(Method::POST, "/auth/login", Some(&body))
            .await?;
        Ok(SecretString::from(response.token))
    }

    async fn logout(&self) -> Result<(), ParleyError> {
        self.execute(Method::POST, "/auth/logout", None).await?;
        Ok(())
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

/// Prefer the backend's own `message`, else the status and raw body.
async fn error_message(status: StatusCode, response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody {
            message: Some(message),
        }) => message,
        _ if body.trim().is_empty() => format!("API returned {status}"),
        _ => format!("API returned {status}: {body}"),
    }
}
