// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One task in a batch send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub node_id: String,
    pub instruction: String,
}

/// Request from a presenter (console, CLI, chatbot binding) to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Identity, connection, queue, and store snapshot
    Status,

    /// Open the hub uplink
    Connect,

    /// Close the hub uplink intentionally
    Disconnect,

    /// Read the plugin config block
    ConfigGet,

    /// Deep-merge a patch into the plugin config block
    ConfigSet { patch: Value },

    /// Cluster directory (15s cache unless forced)
    Nodes {
        #[serde(default)]
        force: bool,
    },

    NodeGet { node_id: String },

    /// Update this node's display name or alias
    NodeUpdate {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        alias: Option<String>,
    },

    /// Subtree rooted at this node
    Tree,

    /// Direct children of this node
    Children,

    /// All clusters visible to this token
    Clusters,

    /// Register this node with the hub and adopt the issued identity
    Register {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        parent_id: Option<String>,
        #[serde(default)]
        cluster_id: Option<String>,
        #[serde(default)]
        invite_code: Option<String>,
    },

    /// Register a child node (identity is not adopted)
    RegisterChild {
        name: String,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        invite_code: Option<String>,
    },

    /// Unregister a node; self when `node_id` is absent
    Unregister {
        #[serde(default)]
        node_id: Option<String>,
    },

    /// Move a node under a new parent (root when absent)
    Reparent {
        node_id: String,
        #[serde(default)]
        new_parent_id: Option<String>,
    },

    InviteCodeGet,

    InviteCodeSet {
        #[serde(default)]
        code: Option<String>,
    },

    SharedConfigGet,

    SharedConfigSet { config: Value },

    /// Send a free-text task to a node (self-targeted tasks may loop back
    /// to the local agent)
    TaskSend { node_id: String, instruction: String },

    TaskList {
        #[serde(default)]
        node_id: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },

    TaskGet { task_id: String },

    TaskCancel { task_id: String },

    /// Clear terminal tasks, optionally only those completed before a cutoff
    TaskClear {
        #[serde(default)]
        before: Option<u64>,
    },

    TaskBatch { tasks: Vec<TaskSpec> },

    ChatSend {
        node_id: String,
        content: String,
        #[serde(default)]
        whole: Option<bool>,
        #[serde(default)]
        auto_refresh_ms: Option<u64>,
    },

    ChatHistory {
        node_id: String,
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Peers with stored chat history
    ChatList,

    ChatClear { node_id: String },

    NodeEvents {
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Latch this connection as the fan-out subscriber; events stream until
    /// the socket closes
    Subscribe,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
