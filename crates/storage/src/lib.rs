// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ch-storage: durable JSON logs for the clawhub node.
//!
//! Four stores live under the node's data directory: sent tasks
//! (`tasks.json`), received tasks (`received-tasks.json`), per-peer chat
//! logs (`chats/<nodeId>.json`), and the lifecycle event ring
//! (`node-events.json`). Every mutation schedules a debounced save; whole
//! files are rewritten atomically (temp + rename) so readers never observe
//! partial state. Loads are best-effort: a missing or corrupt file yields
//! an empty store, and a corrupt per-peer chat file is skipped in isolation.
//!
//! Disk errors are swallowed at this boundary; the next debounced save
//! retries. This crate deliberately carries no logger.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod chats;
mod node_events;
mod persist;
mod received;
mod tasks;

pub use chats::ChatStore;
pub use node_events::NodeEventStore;
pub use received::ReceivedTaskStore;
pub use tasks::{TaskFilter, TaskStore, TaskSummary};

use std::path::Path;
use std::time::Duration;

/// Default debounce window for coalescing writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// All four stores, opened from one data directory.
#[derive(Clone)]
pub struct Stores {
    pub tasks: TaskStore,
    pub received: ReceivedTaskStore,
    pub chats: ChatStore,
    pub node_events: NodeEventStore,
}

impl Stores {
    pub fn open(data_dir: &Path) -> Self {
        Self::open_with_debounce(data_dir, DEFAULT_DEBOUNCE)
    }

    pub fn open_with_debounce(data_dir: &Path, debounce: Duration) -> Self {
        Self {
            tasks: TaskStore::open(data_dir.join("tasks.json"), debounce),
            received: ReceivedTaskStore::open(data_dir.join("received-tasks.json"), debounce),
            chats: ChatStore::open(data_dir.join("chats"), debounce),
            node_events: NodeEventStore::open(data_dir.join("node-events.json"), debounce),
        }
    }

    /// Synchronous flush of every store. Called on shutdown.
    pub fn flush_all(&self) {
        self.tasks.flush();
        self.received.flush();
        self.chats.flush();
        self.node_events.flush();
    }
}
