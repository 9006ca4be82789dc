// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lossy fan-out to the presentation layer.
//!
//! A single presenter channel is latched on first subscribe. Emission never
//! blocks: a slow or absent presenter drops events and re-queries state.

use ch_core::FanoutEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct Fanout {
    sink: Arc<Mutex<Option<mpsc::Sender<FanoutEvent>>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a presenter channel. The first live subscriber wins; a new one
    /// only takes over after the previous channel has closed.
    pub fn attach(&self, tx: mpsc::Sender<FanoutEvent>) -> bool {
        let mut sink = self.sink.lock();
        match sink.as_ref() {
            Some(existing) if !existing.is_closed() => false,
            _ => {
                *sink = Some(tx);
                true
            }
        }
    }

    /// Emit an event, dropping it if the presenter is slow, gone, or never
    /// attached.
    pub fn emit(&self, event: FanoutEvent) {
        let mut sink = self.sink.lock();
        if let Some(tx) = sink.as_ref() {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("fanout: presenter slow, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    *sink = None;
                }
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
