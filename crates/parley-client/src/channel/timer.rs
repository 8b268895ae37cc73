// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellable one-shot timers keyed by [`TimerKind`].
//!
//! Arming a kind replaces its previous handle. Each arm gets a sequence
//! number so a firing that raced with a cancel can be recognized and dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::machine::TimerKind;

/// Delivered to the driver when a timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub seq: u64,
}

#[derive(Debug)]
pub struct Timers {
    armed: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_seq: u64,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl Timers {
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            armed: HashMap::new(),
            next_seq: 0,
            fired_tx,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel(kind);
        self.next_seq += 1;
        let seq = self.next_seq;
        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, seq });
        });
        trace!(?kind, seq, ?delay, "timer armed");
        self.armed.insert(kind, (seq, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((seq, handle)) = self.armed.remove(&kind) {
            handle.abort();
            trace!(?kind, seq, "timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    /// Accept a firing if it belongs to the live handle of its kind.
    ///
    /// Returns false for firings from cancelled or superseded handles.
    pub fn take_fired(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.kind) {
            Some((seq, _)) if *seq == fired.seq => {
                self.armed.remove(&fired.kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
