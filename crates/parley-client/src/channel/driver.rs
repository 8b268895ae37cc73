// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel actor: owns the socket, the timers, and the session protocol.
//!
//! All connection state is mutated from one task. Callers talk to it through
//! a cloneable [`ChannelHandle`]; socket I/O and timers report back through
//! internal queues, so the actor never blocks on anything but its own work.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_config::ParleyConfig;
use parley_core::traits::transport::{
    ABNORMAL_CLOSURE, Connector, NORMAL_CLOSURE, WireMessage, WireSink, WireStream,
};
use parley_core::ParleyError;
use secrecy::ExposeSecret;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::endpoint;
use super::machine::{ChannelEvent, ChannelMachine, ChannelState, ChannelStatus, Effect, TimerKind};
use super::timer::{TimerFired, Timers};
use crate::frame::OutboundFrame;
use crate::protocol::{ProtocolAction, SessionProtocol};
use crate::state::{ErrorKind, SessionState, VisibleError};

/// Close code used when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long a caller-initiated close waits for the close frame to flush.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

const EXHAUSTED_MESSAGE: &str = "WebSocket connection failed after multiple attempts";

/// Channel tuning resolved from configuration.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub token_ack_timeout: Duration,
}

impl ChannelSettings {
    pub fn from_config(config: &ParleyConfig) -> Result<Self, ParleyError> {
        Ok(Self {
            endpoint: endpoint::resolve(&config.client, &config.channel)?,
            connect_timeout: config.channel.connect_timeout(),
            reconnect: ReconnectPolicy::from_config(&config.channel),
            token_ack_timeout: config.channel.token_ack_timeout(),
        })
    }

    /// Default timings against an explicit endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            token_ack_timeout: Duration::from_secs(120),
        }
    }
}

enum Command {
    Connect,
    Disconnect { done: oneshot::Sender<()> },
    Send { frame: OutboundFrame, reply: oneshot::Sender<bool> },
}

enum DriverEvent {
    Opened {
        generation: u64,
        sink: WireSink,
        stream: WireStream,
    },
    OpenFailed {
        generation: u64,
        error: ParleyError,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
        code: u16,
    },
}

/// Cloneable handle to the channel actor.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => f.write_str("Connect"),
            Command::Disconnect { .. } => f.write_str("Disconnect"),
            Command::Send { frame, .. } => write!(f, "Send({})", frame.kind()),
        }
    }
}

impl ChannelHandle {
    /// Start connecting. Returns immediately; progress is visible through
    /// [`status`](Self::status) and the session state.
    pub fn connect(&self) -> Result<(), ParleyError> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| ParleyError::ChannelClosed)
    }

    /// Close the channel and stop reconnecting. Resolves once the close is done.
    pub async fn disconnect(&self) -> Result<(), ParleyError> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { done })
            .map_err(|_| ParleyError::ChannelClosed)?;
        wait.await.map_err(|_| ParleyError::ChannelClosed)
    }

    /// Transmit a frame. Returns whether it was written to an open socket.
    pub async fn send(&self, frame: OutboundFrame) -> bool {
        let (reply, wait) = oneshot::channel();
        if self.commands.send(Command::Send { frame, reply }).is_err() {
            return false;
        }
        wait.await.unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().state.is_open()
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ChannelStatus) -> bool,
    ) -> Result<ChannelStatus, ParleyError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| ParleyError::ChannelClosed)?;
        Ok(*status)
    }
}

/// The actor. Created and started with [`ChannelDriver::spawn`].
pub struct ChannelDriver {
    machine: ChannelMachine,
    protocol: SessionProtocol,
    state: Arc<SessionState>,
    connector: Arc<dyn Connector>,
    endpoint: String,
    token_ack_timeout: Duration,

    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    timers: Timers,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    status_tx: watch::Sender<ChannelStatus>,
    cancel: CancellationToken,

    pending_open: Option<JoinHandle<()>>,
    staged: Option<(WireSink, WireStream)>,
    sink: Option<WireSink>,
    reader: Option<JoinHandle<()>>,
}

impl ChannelDriver {
    /// Spawn the actor on the current runtime.
    ///
    /// The actor runs until `cancel` fires or every handle is dropped.
    pub fn spawn(
        settings: ChannelSettings,
        state: Arc<SessionState>,
        connector: Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> (ChannelHandle, JoinHandle<()>) {
        let (driver, handle) = Self::new(settings, state, connector, cancel);
        (handle, tokio::spawn(driver.run()))
    }

    fn new(
        settings: ChannelSettings,
        state: Arc<SessionState>,
        connector: Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> (Self, ChannelHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let machine = ChannelMachine::new(settings.reconnect, settings.connect_timeout);
        let (status_tx, status_rx) = watch::channel(machine.status());

        let driver = Self {
            machine,
            protocol: SessionProtocol::new(state.clone()),
            state,
            connector,
            endpoint: settings.endpoint,
            token_ack_timeout: settings.token_ack_timeout,
            commands,
            events_tx,
            events_rx,
            timers: Timers::new(timer_tx),
            timer_rx,
            status_tx,
            cancel,
            pending_open: None,
            staged: None,
            sink: None,
            reader: None,
        };
        let handle = ChannelHandle {
            commands: command_tx,
            status: status_rx,
        };
        (driver, handle)
    }

    async fn run(mut self) {
        debug!(endpoint = %self.endpoint, "channel driver started");
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_driver_event(event).await,
                Some(fired) = self.timer_rx.recv() => self.on_timer(fired).await,
            }
        }
        self.shutdown().await;
        debug!("channel driver stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(ChannelEvent::Connect).await,
            Command::Disconnect { done } => {
                self.apply(ChannelEvent::Disconnect).await;
                self.protocol.reset();
                let _ = done.send(());
            }
            Command::Send { frame, reply } => {
                let sent = self.transmit(&frame).await;
                let _ = reply.send(sent);
            }
        }
    }

    async fn on_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Opened {
                generation,
                sink,
                stream,
            } => {
                self.settle_attempt(generation);
                self.staged = Some((sink, stream));
                self.apply(ChannelEvent::Opened { generation }).await;
                if self.staged.take().is_some() {
                    debug!(generation, "discarding superseded connection");
                }
            }
            DriverEvent::OpenFailed { generation, error } => {
                self.settle_attempt(generation);
                warn!(generation, error = %error, "channel open failed");
                self.apply(ChannelEvent::OpenFailed { generation }).await;
            }
            DriverEvent::Frame { generation, text } => {
                if generation != self.machine.generation() || !self.machine.state().is_open() {
                    debug!(generation, "dropping frame from stale connection");
                    return;
                }
                let actions = self.protocol.on_text(&text);
                self.run_protocol(actions).await;
            }
            DriverEvent::Closed { generation, code } => {
                info!(generation, code, "channel closed");
                self.apply(ChannelEvent::Closed { generation, code }).await;
            }
        }
    }

    /// Forget the open task once its own attempt has reported. A late report
    /// from a superseded attempt leaves the live handshake abortable.
    fn settle_attempt(&mut self, generation: u64) {
        if generation == self.machine.generation() {
            self.pending_open = None;
        }
    }

    async fn on_timer(&mut self, fired: TimerFired) {
        if !self.timers.take_fired(fired) {
            return;
        }
        match fired.kind {
            TimerKind::ConnectTimeout => {
                warn!(endpoint = %self.endpoint, "channel connect timed out");
                let generation = self.machine.generation();
                self.apply(ChannelEvent::ConnectTimedOut { generation }).await;
            }
            TimerKind::Reconnect => self.apply(ChannelEvent::ReconnectDue).await,
            TimerKind::TokenAck => {
                let actions = self.protocol.on_ack_timer();
                self.run_protocol(actions).await;
            }
        }
    }

    /// Feed an event to the machine and perform the resulting effects.
    ///
    /// Effects can produce follow-up events; they are queued rather than
    /// applied recursively.
    async fn apply(&mut self, event: ChannelEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.machine.handle(event) {
                if let Some(next) = self.perform(effect).await {
                    queue.push_back(next);
                }
            }
        }
        self.status_tx.send_replace(self.machine.status());
    }

    async fn perform(&mut self, effect: Effect) -> Option<ChannelEvent> {
        match effect {
            Effect::OpenTransport { generation } => self.open(generation),
            Effect::AttachTransport => self.attach(),
            Effect::AbortTransport => {
                if let Some(task) = self.pending_open.take() {
                    task.abort();
                }
                self.staged = None;
            }
            Effect::DetachTransport => self.detach(),
            Effect::CloseTransport { code } => {
                self.close(code).await;
                return Some(ChannelEvent::Released);
            }
            Effect::ArmTimer { kind, delay } => self.timers.arm(kind, delay),
            Effect::CancelTimer(kind) => self.timers.cancel(kind),
            Effect::SendAuth => {
                let token = self
                    .state
                    .credential()
                    .map(|t| t.expose_secret().to_string());
                if token.is_none() {
                    warn!("authenticating channel without a credential");
                }
                self.transmit(&OutboundFrame::Auth { token }).await;
            }
            Effect::SetConnected(connected) => self.state.set_connected(connected),
            Effect::ReconnectExhausted { attempts } => {
                warn!(attempts, "giving up on automatic reconnection");
                self.state.raise_error(VisibleError::fatal(
                    ErrorKind::ReconnectExhausted,
                    EXHAUSTED_MESSAGE,
                ));
            }
        }
        None
    }

    async fn run_protocol(&mut self, actions: Vec<ProtocolAction>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                ProtocolAction::ArmAckTimer => {
                    self.timers.arm(TimerKind::TokenAck, self.token_ack_timeout)
                }
                ProtocolAction::DisarmAckTimer => self.timers.cancel(TimerKind::TokenAck),
                ProtocolAction::SendAck => {
                    let sent = self.transmit(&OutboundFrame::token_refresh_ack()).await;
                    queue.extend(self.protocol.on_ack_sent(sent));
                }
                ProtocolAction::AuthChanged(authenticated) => {
                    self.apply(ChannelEvent::Authenticated(authenticated)).await
                }
                ProtocolAction::Teardown => {
                    info!("session terminated by server");
                    self.apply(ChannelEvent::Disconnect).await;
                    self.protocol.reset();
                    self.state.end_session();
                }
            }
        }
    }

    fn open(&mut self, generation: u64) {
        if let Some(task) = self.pending_open.take() {
            task.abort();
        }
        info!(endpoint = %self.endpoint, generation, "opening channel");

        let connector = self.connector.clone();
        let endpoint = self.endpoint.clone();
        let tx = self.events_tx.clone();
        self.pending_open = Some(tokio::spawn(async move {
            let event = match connector.connect(&endpoint).await {
                Ok((sink, stream)) => DriverEvent::Opened {
                    generation,
                    sink,
                    stream,
                },
                Err(error) => DriverEvent::OpenFailed { generation, error },
            };
            let _ = tx.send(event);
        }));
    }

    fn attach(&mut self) {
        let Some((sink, stream)) = self.staged.take() else {
            warn!("attach requested without an opened transport");
            return;
        };
        let generation = self.machine.generation();
        info!(generation, "channel open");
        self.detach();
        self.sink = Some(sink);
        self.reader = Some(spawn_reader(stream, generation, self.events_tx.clone()));
    }

    fn detach(&mut self) {
        self.sink = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    async fn close(&mut self, code: u16) {
        if let Some(mut sink) = self.sink.take() {
            let flush = async {
                sink.send(WireMessage::Close(Some(code))).await?;
                sink.close().await
            };
            match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await {
                Ok(Ok(())) => debug!(code, "channel closed by client"),
                Ok(Err(e)) => debug!(error = %e, "close frame not delivered"),
                Err(_) => debug!("close frame flush timed out"),
            }
        }
        self.detach();
    }

    /// Serialize and write one frame. Never retries.
    async fn transmit(&mut self, frame: &OutboundFrame) -> bool {
        if !self.machine.state().is_open() {
            debug!(kind = frame.kind(), "channel not open, frame not sent");
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                return false;
            }
        };
        match sink.send(WireMessage::Text(text)).await {
            Ok(()) => {
                debug!(kind = frame.kind(), "frame sent");
                true
            }
            Err(e) => {
                warn!(kind = frame.kind(), error = %e, "frame send failed");
                false
            }
        }
    }

    async fn shutdown(&mut self) {
        self.timers.cancel_all();
        if let Some(task) = self.pending_open.take() {
            task.abort();
        }
        if self.machine.state() == ChannelState::Disconnected {
            self.detach();
        } else {
            self.close(NORMAL_CLOSURE).await;
        }
        self.state.set_connected(false);
    }
}

fn spawn_reader(
    mut stream: WireStream,
    generation: u64,
    tx: mpsc::UnboundedSender<DriverEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let code = loop {
            match stream.next().await {
                Some(WireMessage::Text(text)) => {
                    if tx.send(DriverEvent::Frame { generation, text }).is_err() {
                        return;
                    }
                }
                Some(WireMessage::Close(code)) => break code.unwrap_or(NO_STATUS_RECEIVED),
                None => break ABNORMAL_CLOSURE,
            }
        };
        let _ = tx.send(DriverEvent::Closed { generation, code });
    })
}
