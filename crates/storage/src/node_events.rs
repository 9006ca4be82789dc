// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle event ring (`node-events.json`): last 200 cluster events,
//! most recent first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ch_core::{NodeEvent, NodeEventKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{atomic_write, load_json, schedule_save, updated_at_now, Persist, SaveState};

/// Ring capacity.
pub const NODE_EVENT_CAP: usize = 200;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventFile {
    version: u32,
    updated_at: String,
    events: Vec<NodeEvent>,
}

#[derive(Clone)]
pub struct NodeEventStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    events: Mutex<Vec<NodeEvent>>,
    save: SaveState,
}

impl Persist for Inner {
    fn save_state(&self) -> &SaveState {
        &self.save
    }

    fn write_now(&self) {
        let file = EventFile {
            version: 1,
            updated_at: updated_at_now(),
            events: self.events.lock().clone(),
        };
        if let Ok(bytes) = serde_json::to_vec_pretty(&file) {
            let _ = atomic_write(&self.path, &bytes);
        }
    }
}

impl NodeEventStore {
    pub fn open(path: PathBuf, debounce: Duration) -> Self {
        let events = load_json::<EventFile>(&path).map(|f| f.events).unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                path,
                events: Mutex::new(events),
                save: SaveState::new(debounce),
            }),
        }
    }

    /// Record an event at the front of the ring and return it.
    pub fn record(
        &self,
        node_id: &str,
        node_name: Option<String>,
        kind: NodeEventKind,
        at_ms: u64,
    ) -> NodeEvent {
        let event = NodeEvent {
            node_id: node_id.to_string(),
            node_name,
            event: kind,
            timestamp: at_ms,
        };
        {
            let mut events = self.inner.events.lock();
            events.insert(0, event.clone());
            events.truncate(NODE_EVENT_CAP);
        }
        schedule_save(&self.inner);
        event
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<NodeEvent> {
        let events = self.inner.events.lock();
        match limit {
            Some(limit) => events.iter().take(limit).cloned().collect(),
            None => events.clone(),
        }
    }

    pub fn flush(&self) {
        self.inner.write_now();
    }
}

#[cfg(test)]
#[path = "node_events_tests.rs"]
mod tests;
