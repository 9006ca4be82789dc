// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incoming peer chat.
//!
//! A user chat frame runs on the per-peer agent session
//! (`hub-chat:<peer>`), so conversation context carries across turns. While
//! the run is inflight an optional harvester streams new transcript entries
//! back as `delta` frames; one final `assistant` frame with `done: true`
//! closes the exchange. The delta cursor lives on the run, never across
//! runs, and a second user frame for a peer whose run is still inflight is
//! rejected with an immediate error reply.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ch_core::{chat_session_key, ChatRole, Clock, FanoutEvent};
use ch_storage::ChatStore;
use ch_wire::{ChatConfig, ChatEntry, ChatPayload, ChatWireRole, Frame};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::{collect_assistant_text, reduce_content, AgentBridge, AgentMessage};
use crate::fanout::Fanout;

/// Agent wait budget for one chat turn.
pub const CHAT_WAIT_TIMEOUT_MS: u64 = 300_000;

/// Error reply prefix, kept byte-for-byte from the wire contract.
pub const CHAT_ERROR_PREFIX: &str = "❌ 处理失败: ";

pub struct ChatHandler<B, C: Clock> {
    inner: Arc<Inner<B, C>>,
}

impl<B, C: Clock> Clone for ChatHandler<B, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<B, C: Clock> {
    bridge: Arc<B>,
    clock: C,
    chats: ChatStore,
    fanout: Fanout,
    sink: mpsc::Sender<Frame>,
    /// Session keys with an inflight run.
    active: Mutex<HashSet<String>>,
    wait_timeout_ms: u64,
}

impl<B, C> ChatHandler<B, C>
where
    B: AgentBridge,
    C: Clock,
{
    pub fn new(
        bridge: Arc<B>,
        clock: C,
        chats: ChatStore,
        fanout: Fanout,
        sink: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                clock,
                chats,
                fanout,
                sink,
                active: Mutex::new(HashSet::new()),
                wait_timeout_ms: CHAT_WAIT_TIMEOUT_MS,
            }),
        }
    }

    #[cfg(test)]
    fn with_wait_timeout(self, wait_timeout_ms: u64) -> Self {
        // Test-only: Arc is sole-owned right after construction.
        let mut inner = Arc::try_unwrap(self.inner).ok().expect("handler already shared");
        inner.wait_timeout_ms = wait_timeout_ms;
        Self { inner: Arc::new(inner) }
    }

    /// Accept a user chat frame and run it in the background.
    pub fn handle_user_chat(&self, frame: Frame) {
        let handler = self.clone();
        tokio::spawn(async move { handler.run(frame).await });
    }

    async fn run(&self, frame: Frame) {
        let Some(payload) = frame.payload_as::<ChatPayload>() else {
            tracing::debug!(id = %frame.id, "malformed chat payload, dropped");
            return;
        };
        if payload.role != ChatWireRole::User {
            tracing::debug!(id = %frame.id, "non-user chat frame reached the handler, dropped");
            return;
        }
        let Some(from) = frame.from.clone() else {
            tracing::debug!(id = %frame.id, "chat frame without sender, dropped");
            return;
        };
        let chat_id = frame.id.clone();
        let content = payload.content.unwrap_or_default();
        let config = payload.config.unwrap_or_default();
        let session_key = chat_session_key(&from);

        // One run per peer session at a time; the delta cursor is
        // single-writer by construction.
        if !self.inner.active.lock().insert(session_key.clone()) {
            tracing::warn!(peer = %from, "chat rejected, previous run still inflight");
            self.send_error(&from, &chat_id, "a previous chat is still running").await;
            return;
        }

        let now = self.inner.clock.epoch_ms();
        let message = self.inner.chats.append(&from, ChatRole::User, content.clone(), now);
        self.inner.fanout.emit(FanoutEvent::ChatMessage { node_id: from.clone(), message });

        let outcome = self.run_turn(&from, &chat_id, &content, &session_key, &config).await;
        if let Err(error) = outcome {
            tracing::warn!(peer = %from, error = %error, "chat turn failed");
            self.send_error(&from, &chat_id, &error).await;
        }

        self.inner.active.lock().remove(&session_key);
    }

    async fn run_turn(
        &self,
        from: &str,
        chat_id: &str,
        content: &str,
        session_key: &str,
        config: &ChatConfig,
    ) -> Result<(), String> {
        let run_id = self
            .inner
            .bridge
            .submit(content, session_key, chat_id)
            .await
            .map_err(|e| e.to_string())?;

        let harvester = match config.auto_refresh_ms {
            Some(interval_ms) if interval_ms > 0 => Some(tokio::spawn(stream_deltas(
                Arc::clone(&self.inner.bridge),
                self.inner.sink.clone(),
                self.inner.clock.clone(),
                session_key.to_string(),
                from.to_string(),
                chat_id.to_string(),
                config.whole,
                interval_ms,
            ))),
            _ => None,
        };

        let waited = self.inner.bridge.wait(&run_id, self.inner.wait_timeout_ms).await;
        // The periodic harvester never outlives the wait.
        if let Some(harvester) = harvester {
            harvester.abort();
        }
        waited.map_err(|e| e.to_string())?;

        let history = self.inner.bridge.history(session_key).await.map_err(|e| e.to_string())?;
        let now = self.inner.clock.epoch_ms();
        let reply = ChatPayload::assistant_done(
            format_messages(&history, config.whole),
            chat_id,
            now,
        );
        let mut frame = Frame::chat(from, &reply);
        frame.timestamp = Some(now);
        self.send_frame(frame).await;

        let text = collect_assistant_text(&history);
        let message = self.inner.chats.append(from, ChatRole::Assistant, text, now);
        self.inner.fanout.emit(FanoutEvent::ChatMessage { node_id: from.to_string(), message });
        Ok(())
    }

    async fn send_error(&self, to: &str, chat_id: &str, error: &str) {
        let now = self.inner.clock.epoch_ms();
        let payload = ChatPayload::assistant_text(
            format!("{}{}", CHAT_ERROR_PREFIX, error),
            chat_id,
            now,
        );
        self.send_frame(Frame::chat(to, &payload)).await;
    }

    async fn send_frame(&self, frame: Frame) {
        if self.inner.sink.send(frame).await.is_err() {
            tracing::warn!("chat frame sink closed");
        }
    }
}

/// Periodic transcript harvester. `last_sent` only ever advances, so deltas
/// carry no duplicates and no gaps.
#[allow(clippy::too_many_arguments)]
async fn stream_deltas<B: AgentBridge, C: Clock>(
    bridge: Arc<B>,
    sink: mpsc::Sender<Frame>,
    clock: C,
    session_key: String,
    to: String,
    chat_id: String,
    whole: bool,
    interval_ms: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the immediate first tick would always be empty

    let mut last_sent = 0usize;
    loop {
        ticker.tick().await;
        let history = match bridge.history(&session_key).await {
            Ok(history) => history,
            Err(e) => {
                tracing::debug!(session = %session_key, error = %e, "delta harvest failed");
                continue;
            }
        };
        if history.len() <= last_sent {
            continue;
        }
        let fresh = &history[last_sent..];
        let payload =
            ChatPayload::delta(format_messages(fresh, whole), &chat_id, clock.epoch_ms());
        if sink.send(Frame::chat(&to, &payload)).await.is_err() {
            return;
        }
        last_sent = history.len();
    }
}

/// Shape transcript entries for a chat reply. With `whole` unset, content is
/// reduced to its text blocks; otherwise it passes through unchanged.
pub fn format_messages(messages: &[AgentMessage], whole: bool) -> Vec<ChatEntry> {
    messages
        .iter()
        .map(|message| ChatEntry {
            role: message.role.clone(),
            content: if whole {
                message.content.clone()
            } else {
                Value::String(reduce_content(&message.content))
            },
            timestamp: message.timestamp,
        })
        .collect()
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
