// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity, peer directory entries, and lifecycle events.

use serde::{Deserialize, Serialize};

/// This node's durable identity, issued at registration and written back to
/// the config file after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeIdentity {
    pub node_id: Option<String>,
    pub node_name: String,
    pub node_alias: Option<String>,
    pub cluster_id: Option<String>,
    /// None → this node is a cluster root.
    pub parent_id: Option<String>,
    pub token: Option<String>,
    pub capabilities: Vec<String>,
}

impl NodeIdentity {
    pub fn is_registered(&self) -> bool {
        self.node_id.is_some() && self.token.is_some()
    }

    /// Drop everything issued by the hub. Name, alias, and capabilities are
    /// locally chosen and survive unregistration.
    pub fn clear(&mut self) {
        self.node_id = None;
        self.cluster_id = None;
        self.parent_id = None;
        self.token = None;
    }
}

/// A peer as reported by the hub directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub cluster_id: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub load: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub connected_at: Option<u64>,
    #[serde(default)]
    pub last_heartbeat: Option<u64>,
    #[serde(default)]
    pub active_tasks: u32,
}

/// Kind of cluster lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeEventKind {
    Online,
    Offline,
    Registered,
    Departed,
}

/// A lifecycle event observed on the system broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub event: NodeEventKind,
    pub timestamp: u64,
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
