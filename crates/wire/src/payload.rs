// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed payloads for each frame type.

use ch_core::TaskPriority;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of an outbound/inbound `task` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Free-text instruction for the target's local agent.
    pub task: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TaskQueueHints>,
}

/// Optional per-task queue hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueueHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
}

/// Queue-side acknowledgement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Queued,
    Running,
}

/// Payload of a `task_ack` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAckPayload {
    pub status: AckStatus,
    /// 1-based position in the wait queue; only present when queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl TaskAckPayload {
    pub fn queued(position: usize) -> Self {
        Self { status: AckStatus::Queued, position: Some(position) }
    }

    pub fn running() -> Self {
        Self { status: AckStatus::Running, position: None }
    }
}

/// Payload of an intermediate `task_status` frame. The status string feeds
/// the same monotonic store guard as acks, so unknown values are harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusPayload {
    pub status: String,
}

/// Payload of a `task_cancel` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCancelPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of a terminal `result` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultPayload {
    pub fn ok(result: impl Into<String>) -> Self {
        Self { success: true, result: Some(result.into()), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(error.into()) }
    }
}

/// Role tag on a chat frame. `Delta` marks intermediate streaming batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatWireRole {
    User,
    Assistant,
    Delta,
}

/// Streaming options a chat sender may attach to a user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// Pass message content through unreduced (keep non-text blocks).
    pub whole: bool,
    /// Interval for delta streaming; absent or 0 disables it.
    pub auto_refresh_ms: Option<u64>,
}

/// One transcript entry in a chat reply. `content` is a plain string after
/// text reduction, or the raw block structure when `whole` was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Payload of a `chat` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub role: ChatWireRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ChatConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl ChatPayload {
    pub fn user(content: impl Into<String>, config: ChatConfig, timestamp: u64) -> Self {
        Self {
            role: ChatWireRole::User,
            content: Some(content.into()),
            messages: None,
            config: Some(config),
            reply_to: None,
            timestamp,
            done: None,
        }
    }

    /// Final assistant reply carrying the full transcript.
    pub fn assistant_done(messages: Vec<ChatEntry>, reply_to: &str, timestamp: u64) -> Self {
        Self {
            role: ChatWireRole::Assistant,
            content: None,
            messages: Some(messages),
            config: None,
            reply_to: Some(reply_to.into()),
            timestamp,
            done: Some(true),
        }
    }

    /// Intermediate delta batch.
    pub fn delta(messages: Vec<ChatEntry>, reply_to: &str, timestamp: u64) -> Self {
        Self {
            role: ChatWireRole::Delta,
            content: None,
            messages: Some(messages),
            config: None,
            reply_to: Some(reply_to.into()),
            timestamp,
            done: Some(false),
        }
    }

    /// Plain-text assistant reply (error reports, no-op answers).
    pub fn assistant_text(content: impl Into<String>, reply_to: &str, timestamp: u64) -> Self {
        Self {
            role: ChatWireRole::Assistant,
            content: Some(content.into()),
            messages: None,
            config: None,
            reply_to: Some(reply_to.into()),
            timestamp,
            done: Some(true),
        }
    }
}

/// Payload of an outbound `heartbeat` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub load: f64,
    pub active_tasks: u32,
}

/// Payload of an inbound `direct` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPayload {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Per-cluster shared configuration pushed by the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_config: Option<Value>,
}

/// Parsed lifecycle broadcast on the `system` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemBroadcast {
    NodeOnline { node_id: String },
    NodeOffline { node_id: String },
    /// Membership/topology change: child_registered, child_unregistered,
    /// child_departed, child_arrived, reparented.
    Topology { action: String, node_id: Option<String> },
}

/// Parse a `broadcast` payload observed on the `system` channel. Unknown
/// actions yield `None` and the frame is dropped.
pub fn parse_system_broadcast(payload: &Value) -> Option<SystemBroadcast> {
    let action = payload.get("action")?.as_str()?;
    let node_id = payload.get("nodeId").and_then(|v| v.as_str()).map(|s| s.to_string());
    match action {
        "node_online" => Some(SystemBroadcast::NodeOnline { node_id: node_id? }),
        "node_offline" => Some(SystemBroadcast::NodeOffline { node_id: node_id? }),
        "child_registered" | "child_unregistered" | "child_departed" | "child_arrived"
        | "reparented" => Some(SystemBroadcast::Topology { action: action.to_string(), node_id }),
        _ => None,
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
