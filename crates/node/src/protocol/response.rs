// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ch_core::{ChatMessage, FanoutEvent, NodeConfig, NodeEvent, PeerNode, StoredTask};
use ch_storage::TaskSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::HubStatus;
use crate::queue::QueueStatus;

/// Combined snapshot for the status verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub hub: HubStatus,
    pub queue: QueueStatus,
    pub sent_tasks: TaskSummary,
}

/// Response from the node to a presenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Verb failed; `message` is presenter-facing
    Error { message: String },

    Status { status: Box<NodeStatus> },

    Config { config: Box<NodeConfig> },

    Nodes { nodes: Vec<PeerNode> },

    Node { node: Box<PeerNode> },

    /// Tree/cluster shapes are hub-defined; passed through opaquely
    TreeData { data: Value },

    Registered {
        node_id: String,
        cluster_id: String,
        #[serde(default)]
        parent_id: Option<String>,
        depth: u32,
    },

    InviteCode {
        #[serde(default)]
        code: Option<String>,
    },

    SharedConfig {
        #[serde(default)]
        config: Option<Value>,
    },

    TaskSent { task: Box<StoredTask> },

    Tasks { tasks: Vec<StoredTask> },

    Task { task: Box<StoredTask> },

    TaskCancelled { cancelled: bool },

    TasksCleared { cleared: usize },

    TasksSent { tasks: Vec<StoredTask> },

    ChatSent { message: ChatMessage },

    ChatMessages { messages: Vec<ChatMessage> },

    ChatPeers { nodes: Vec<String> },

    NodeEvents { events: Vec<NodeEvent> },

    /// Subscription accepted; fan-out events follow on this connection
    Subscribed,

    /// One fan-out event on a subscribed connection
    Event { event: FanoutEvent },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
