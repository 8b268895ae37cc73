// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock socket connector for deterministic channel tests.
//!
//! `MockConnector` implements `Connector` with a script of per-attempt
//! outcomes. Every accepted connection yields a [`MockSocket`] that captures
//! outbound frames and lets the test push inbound frames or close the socket.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Sink, stream};
use parley_core::traits::transport::{Connector, WireMessage, WireSink, WireStream};
use parley_core::ParleyError;
use serde_json::Value;
use tokio::sync::{Notify, mpsc};

/// What a connection attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Handshake succeeds.
    Accept,
    /// Handshake fails immediately.
    Refuse,
    /// Handshake never completes.
    Hang,
}

struct SocketInner {
    sent: Mutex<Vec<WireMessage>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    fail_sends: AtomicBool,
    notify: Notify,
}

/// One accepted connection, seen from the server side.
#[derive(Clone)]
pub struct MockSocket {
    inner: Arc<SocketInner>,
}

impl MockSocket {
    fn open() -> (Self, WireSink, WireStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SocketInner {
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(Some(tx)),
            fail_sends: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let sink = MockSink {
            inner: inner.clone(),
        };
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        (Self { inner }, Box::pin(sink), Box::pin(stream))
    }

    /// Deliver a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        if let Some(tx) = self.inner.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(WireMessage::Text(text.into()));
        }
    }

    /// Deliver a JSON frame to the client.
    pub fn push_json(&self, frame: Value) {
        self.push_text(frame.to_string());
    }

    /// Send a close frame with `code`, then end the stream.
    pub fn close(&self, code: Option<u16>) {
        if let Some(tx) = self.inner.inbound.lock().unwrap().take() {
            let _ = tx.send(WireMessage::Close(code));
        }
    }

    /// End the stream without a close frame.
    pub fn drop_connection(&self) {
        self.inner.inbound.lock().unwrap().take();
    }

    /// Make subsequent client writes fail.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Everything the client wrote, in order.
    pub fn sent(&self) -> Vec<WireMessage> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// Text frames the client wrote, parsed as JSON.
    pub fn sent_frames(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter_map(|msg| match msg {
                WireMessage::Text(text) => serde_json::from_str(&text).ok(),
                WireMessage::Close(_) => None,
            })
            .collect()
    }

    /// Text frames of one `type`.
    pub fn sent_of_type(&self, kind: &str) -> Vec<Value> {
        self.sent_frames()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }

    /// Close code the client sent, if it closed the socket.
    pub fn client_close_code(&self) -> Option<Option<u16>> {
        self.sent().into_iter().find_map(|msg| match msg {
            WireMessage::Close(code) => Some(code),
            WireMessage::Text(_) => None,
        })
    }

    /// Wait until at least `count` frames of `kind` have been written.
    pub async fn wait_for_sent(&self, kind: &str, count: usize) -> Vec<Value> {
        loop {
            let notified = self.inner.notify.notified();
            let frames = self.sent_of_type(kind);
            if frames.len() >= count {
                return frames;
            }
            notified.await;
        }
    }
}

struct MockSink {
    inner: Arc<SocketInner>,
}

impl Sink<WireMessage> for MockSink {
    type Error = ParleyError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WireMessage) -> Result<(), Self::Error> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(ParleyError::transport("mock send failure"));
        }
        self.inner.sent.lock().unwrap().push(item);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A connector whose attempts follow a script.
///
/// Scripted behaviors are consumed in order; once the script is empty every
/// attempt uses the fallback behavior.
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectBehavior>>,
    fallback: ConnectBehavior,
    sockets: Mutex<Vec<MockSocket>>,
    urls: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    notify: Notify,
}

impl MockConnector {
    /// Every attempt succeeds.
    pub fn new() -> Self {
        Self::with_fallback(ConnectBehavior::Accept)
    }

    /// Every attempt fails.
    pub fn refusing() -> Self {
        Self::with_fallback(ConnectBehavior::Refuse)
    }

    pub fn with_fallback(fallback: ConnectBehavior) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            sockets: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Queue behaviors for the next attempts.
    pub fn script(&self, behaviors: impl IntoIterator<Item = ConnectBehavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URLs passed to `connect`, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Number of accepted connections.
    pub fn socket_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn socket(&self, index: usize) -> Option<MockSocket> {
        self.sockets.lock().unwrap().get(index).cloned()
    }

    pub fn last_socket(&self) -> Option<MockSocket> {
        self.sockets.lock().unwrap().last().cloned()
    }

    /// Wait for the `index`-th accepted connection (0-based).
    pub async fn wait_for_socket(&self, index: usize) -> MockSocket {
        loop {
            let notified = self.notify.notified();
            if let Some(socket) = self.socket(index) {
                return socket;
            }
            notified.await;
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(WireSink, WireStream), ParleyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match behavior {
            ConnectBehavior::Accept => {
                let (socket, sink, stream) = MockSocket::open();
                self.sockets.lock().unwrap().push(socket);
                self.notify.notify_waiters();
                Ok((sink, stream))
            }
            ConnectBehavior::Refuse => Err(ParleyError::transport("connection refused")),
            ConnectBehavior::Hang => futures::future::pending().await,
        }
    }
}
