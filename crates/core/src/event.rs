// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events pushed to the presentation layer over the fan-out channel.
//!
//! The channel is lossy by design: a slow presenter drops events and
//! re-queries, it never blocks the coordinator.
//!
//! Serializes adjacently tagged: `{"event": "task.update", "data": {...}}`.

use crate::chat::ChatMessage;
use crate::node::NodeEvent;
use crate::task::StoredTask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum FanoutEvent {
    /// A sent task changed state.
    #[serde(rename = "task.update")]
    TaskUpdate { task: StoredTask },

    /// A chat message was appended to a peer log.
    #[serde(rename = "chat.message")]
    ChatMessage {
        #[serde(rename = "nodeId")]
        node_id: String,
        message: ChatMessage,
    },

    /// A cluster lifecycle event was observed.
    #[serde(rename = "node.event")]
    NodeEvent { event: NodeEvent },
}
