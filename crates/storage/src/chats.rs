// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-peer chat logs (`chats/<nodeId>.json`).
//!
//! One file per peer, capped at 500 messages each. A corrupt file only
//! loses that peer's history; the rest of the directory loads normally.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ch_core::{ChatMessage, ChatRole};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{atomic_write, load_json, schedule_save, updated_at_now, Persist, SaveState};

/// Maximum retained messages per peer.
pub const CHAT_CAP: usize = 500;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatFile {
    version: u32,
    node_id: String,
    updated_at: String,
    messages: Vec<ChatMessage>,
}

#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    state: Mutex<ChatState>,
    save: SaveState,
}

#[derive(Default)]
struct ChatState {
    /// peer id → oldest-first message log
    logs: HashMap<String, Vec<ChatMessage>>,
    /// peers with unwritten changes
    dirty: HashSet<String>,
}

impl Persist for Inner {
    fn save_state(&self) -> &SaveState {
        &self.save
    }

    fn write_now(&self) {
        let pending: Vec<(String, Vec<ChatMessage>)> = {
            let mut state = self.state.lock();
            let dirty = std::mem::take(&mut state.dirty);
            dirty
                .into_iter()
                .filter_map(|node_id| {
                    state.logs.get(&node_id).map(|log| (node_id, log.clone()))
                })
                .collect()
        };
        for (node_id, messages) in pending {
            let file = ChatFile {
                version: 1,
                node_id: node_id.clone(),
                updated_at: updated_at_now(),
                messages,
            };
            if let Ok(bytes) = serde_json::to_vec_pretty(&file) {
                let _ = atomic_write(&self.dir.join(format!("{}.json", node_id)), &bytes);
            }
        }
    }
}

impl ChatStore {
    pub fn open(dir: PathBuf, debounce: Duration) -> Self {
        let mut logs = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                // A malformed file is isolated: skip it, keep the rest.
                if let Some(file) = load_json::<ChatFile>(&path) {
                    logs.insert(file.node_id, file.messages);
                }
            }
        }
        Self {
            inner: Arc::new(Inner {
                dir,
                state: Mutex::new(ChatState { logs, dirty: HashSet::new() }),
                save: SaveState::new(debounce),
            }),
        }
    }

    /// Append a message to a peer's log and return the stored record.
    pub fn append(
        &self,
        node_id: &str,
        role: ChatRole,
        content: impl Into<String>,
        at_ms: u64,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: ch_core::new_uuid(),
            node_id: node_id.to_string(),
            role,
            content: content.into(),
            timestamp: at_ms,
        };
        {
            let mut state = self.inner.state.lock();
            let log = state.logs.entry(node_id.to_string()).or_default();
            log.push(message.clone());
            if log.len() > CHAT_CAP {
                let excess = log.len() - CHAT_CAP;
                log.drain(..excess);
            }
            state.dirty.insert(node_id.to_string());
        }
        schedule_save(&self.inner);
        message
    }

    /// Most recent `limit` messages (oldest first), or the whole log.
    pub fn history(&self, node_id: &str, limit: Option<usize>) -> Vec<ChatMessage> {
        let state = self.inner.state.lock();
        let Some(log) = state.logs.get(node_id) else {
            return Vec::new();
        };
        match limit {
            Some(limit) if limit < log.len() => log[log.len() - limit..].to_vec(),
            _ => log.clone(),
        }
    }

    /// Peers with at least one stored message.
    pub fn active_nodes(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut nodes: Vec<String> =
            state.logs.iter().filter(|(_, log)| !log.is_empty()).map(|(id, _)| id.clone()).collect();
        nodes.sort();
        nodes
    }

    /// Drop a peer's history and delete its file.
    pub fn clear(&self, node_id: &str) {
        {
            let mut state = self.inner.state.lock();
            state.logs.remove(node_id);
            state.dirty.remove(node_id);
        }
        let _ = std::fs::remove_file(self.inner.dir.join(format!("{}.json", node_id)));
    }

    pub fn flush(&self) {
        self.inner.write_now();
    }
}

#[cfg(test)]
#[path = "chats_tests.rs"]
mod tests;
