// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket connector backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use parley_core::ParleyError;
use parley_core::traits::transport::{ABNORMAL_CLOSURE, Connector, WireMessage, WireSink, WireStream};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

/// Opens real WebSocket connections (with rustls for `wss://`).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(WireSink, WireStream), ParleyError> {
        let (socket, response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ParleyError::Transport {
                    message: format!("failed to open {url}"),
                    source: Some(Box::new(e)),
                })?;
        debug!(%url, status = %response.status(), "websocket handshake complete");

        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(|e| ParleyError::Transport {
                message: "websocket send failed".into(),
                source: Some(Box::new(e)),
            })
            .with(|msg: WireMessage| future::ready(Ok::<_, ParleyError>(encode(msg))));
        let stream = stream.filter_map(|item| future::ready(decode(item)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn encode(msg: WireMessage) -> Message {
    match msg {
        WireMessage::Text(text) => Message::text(text),
        WireMessage::Close(code) => Message::Close(code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: "client closing".into(),
        })),
    }
}

fn decode(item: Result<Message, tungstenite::Error>) -> Option<WireMessage> {
    match item {
        Ok(Message::Text(text)) => Some(WireMessage::Text(text.to_string())),
        Ok(Message::Close(frame)) => Some(WireMessage::Close(frame.map(|f| u16::from(f.code)))),
        // Pings are answered by tungstenite itself.
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "websocket read failed");
            Some(WireMessage::Close(Some(ABNORMAL_CLOSURE)))
        }
    }
}
