// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure connection lifecycle state machine.
//!
//! [`ChannelMachine::handle`] takes one [`ChannelEvent`] and returns the
//! [`Effect`]s the driver must perform. It does no I/O and owns no timers,
//! which keeps every lifecycle rule testable without a runtime.
//!
//! Each connection attempt gets a generation number. Events that carry a
//! generation other than the current one come from a superseded attempt and
//! are ignored.

use std::time::Duration;

use parley_core::traits::transport::NORMAL_CLOSURE;

use super::backoff::ReconnectPolicy;

/// Lifecycle state of the socket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ChannelState {
    #[strum(serialize = "DISCONNECTED")]
    Disconnected,
    #[strum(serialize = "CONNECTING")]
    Connecting,
    #[strum(serialize = "OPEN")]
    Open { authenticated: bool },
    #[strum(serialize = "CLOSING")]
    Closing,
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, ChannelState::Open { .. })
    }
}

/// Timers owned by the channel driver. One live handle per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConnectTimeout,
    Reconnect,
    TokenAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Caller asked to connect.
    Connect,
    /// Caller asked to disconnect.
    Disconnect,
    /// The transport for `generation` finished its handshake.
    Opened { generation: u64 },
    /// The transport for `generation` could not be opened.
    OpenFailed { generation: u64 },
    /// The live transport for `generation` closed with `code`.
    Closed { generation: u64, code: u16 },
    /// The connect-timeout guard for `generation` fired.
    ConnectTimedOut { generation: u64 },
    /// The reconnect backoff timer fired.
    ReconnectDue,
    /// A caller-initiated close finished.
    Released,
    /// The server accepted or rejected our AUTH frame.
    Authenticated(bool),
}

/// Work the driver performs on behalf of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start opening a transport tagged with `generation`.
    OpenTransport { generation: u64 },
    /// Install the transport that just opened.
    AttachTransport,
    /// Drop any in-flight open.
    AbortTransport,
    /// Drop the live transport without a close handshake.
    DetachTransport,
    /// Close the live transport with `code`, then report [`ChannelEvent::Released`].
    CloseTransport { code: u16 },
    ArmTimer { kind: TimerKind, delay: Duration },
    CancelTimer(TimerKind),
    /// Send AUTH with the current credential.
    SendAuth,
    SetConnected(bool),
    /// Automatic reconnection gave up.
    ReconnectExhausted { attempts: u32 },
}

/// Status snapshot published to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Reconnect attempts made since the last successful open.
    pub attempts: u32,
    /// Backoff delay of the pending reconnect, if one is scheduled.
    pub next_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct ChannelMachine {
    state: ChannelState,
    generation: u64,
    attempts: u32,
    intentional: bool,
    next_delay: Option<Duration>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
}

impl ChannelMachine {
    pub fn new(policy: ReconnectPolicy, connect_timeout: Duration) -> Self {
        Self {
            state: ChannelState::Disconnected,
            generation: 0,
            attempts: 0,
            intentional: false,
            next_delay: None,
            policy,
            connect_timeout,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.state,
            attempts: self.attempts,
            next_delay: self.next_delay,
        }
    }

    pub fn handle(&mut self, event: ChannelEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            ChannelEvent::Connect => {
                if self.state.is_open() {
                    return effects;
                }
                if self.state == ChannelState::Connecting {
                    effects.push(Effect::AbortTransport);
                }
                self.intentional = false;
                self.attempts = 0;
                self.next_delay = None;
                effects.push(Effect::CancelTimer(TimerKind::Reconnect));
                self.begin_attempt(&mut effects);
            }

            ChannelEvent::ReconnectDue => {
                if self.state != ChannelState::Disconnected || self.intentional {
                    return effects;
                }
                self.next_delay = None;
                self.begin_attempt(&mut effects);
            }

            ChannelEvent::Opened { generation } => {
                if !self.is_current(generation, ChannelState::Connecting) {
                    return effects;
                }
                self.state = ChannelState::Open {
                    authenticated: false,
                };
                self.attempts = 0;
                self.next_delay = None;
                effects.extend([
                    Effect::CancelTimer(TimerKind::ConnectTimeout),
                    Effect::AttachTransport,
                    Effect::SetConnected(true),
                    Effect::SendAuth,
                ]);
            }

            ChannelEvent::OpenFailed { generation } => {
                if !self.is_current(generation, ChannelState::Connecting) {
                    return effects;
                }
                self.state = ChannelState::Disconnected;
                effects.push(Effect::CancelTimer(TimerKind::ConnectTimeout));
                self.schedule_reconnect(&mut effects);
            }

            ChannelEvent::ConnectTimedOut { generation } => {
                if !self.is_current(generation, ChannelState::Connecting) {
                    return effects;
                }
                // Late events from the aborted attempt become stale.
                self.generation += 1;
                self.state = ChannelState::Disconnected;
                effects.push(Effect::AbortTransport);
                self.schedule_reconnect(&mut effects);
            }

            ChannelEvent::Closed { generation, code } => {
                if generation != self.generation || !self.state.is_open() {
                    return effects;
                }
                self.state = ChannelState::Disconnected;
                effects.extend([Effect::DetachTransport, Effect::SetConnected(false)]);
                if !self.intentional && code != NORMAL_CLOSURE {
                    self.schedule_reconnect(&mut effects);
                }
            }

            ChannelEvent::Disconnect => {
                self.intentional = true;
                self.next_delay = None;
                effects.extend([
                    Effect::CancelTimer(TimerKind::Reconnect),
                    Effect::CancelTimer(TimerKind::ConnectTimeout),
                    Effect::CancelTimer(TimerKind::TokenAck),
                ]);
                match self.state {
                    ChannelState::Open { .. } => {
                        self.generation += 1;
                        self.state = ChannelState::Closing;
                        effects.push(Effect::CloseTransport {
                            code: NORMAL_CLOSURE,
                        });
                    }
                    ChannelState::Connecting => {
                        self.generation += 1;
                        self.state = ChannelState::Disconnected;
                        effects.push(Effect::AbortTransport);
                    }
                    ChannelState::Disconnected | ChannelState::Closing => {}
                }
                effects.push(Effect::SetConnected(false));
            }

            ChannelEvent::Released => {
                if self.state == ChannelState::Closing {
                    self.state = ChannelState::Disconnected;
                }
            }

            ChannelEvent::Authenticated(authenticated) => {
                if self.state.is_open() {
                    self.state = ChannelState::Open { authenticated };
                }
            }
        }
        effects
    }

    fn is_current(&self, generation: u64, state: ChannelState) -> bool {
        generation == self.generation && self.state == state
    }

    fn begin_attempt(&mut self, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.state = ChannelState::Connecting;
        effects.extend([
            Effect::OpenTransport {
                generation: self.generation,
            },
            Effect::ArmTimer {
                kind: TimerKind::ConnectTimeout,
                delay: self.connect_timeout,
            },
        ]);
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if !self.policy.allows(self.attempts) {
            self.next_delay = None;
            effects.push(Effect::ReconnectExhausted {
                attempts: self.attempts,
            });
            return;
        }
        self.attempts += 1;
        let delay = self.policy.delay_for(self.attempts);
        self.next_delay = Some(delay);
        effects.push(Effect::ArmTimer {
            kind: TimerKind::Reconnect,
            delay,
        });
    }
}
