// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events the hub uplink emits toward the coordinator.
//!
//! The uplink owns the channel and never calls back into the coordinator;
//! the coordinator subscribes to the receiver handed out at construction.

use ch_core::TaskStatus;
use ch_wire::{Frame, ResultPayload, TaskPayload};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// WebSocket session established.
    Connected,
    /// WebSocket session lost (reconnect may follow).
    Disconnected,

    /// A peer asked this node to execute a task.
    TaskReceived { task_id: String, from: String, payload: TaskPayload },

    /// Ack or intermediate status for a task this node sent.
    TaskStatusUpdate { task_id: String, status: TaskStatus, position: Option<usize> },

    /// Terminal outcome for a task this node sent.
    TaskResult { task_id: String, payload: ResultPayload },

    /// A peer asked to cancel a task it sent us.
    TaskCancelRequested { task_id: String, from: Option<String>, reason: Option<String> },

    /// Inbound chat frame (user message, assistant reply, or delta).
    ChatFrame { frame: Frame },

    /// Lifecycle broadcast: a peer came online.
    NodeOnline { node_id: String },
    /// Lifecycle broadcast: a peer went offline.
    NodeOffline { node_id: String },
    /// Topology broadcast (registration, departure, reparent).
    TopologyChanged { action: String, node_id: Option<String> },

    /// Per-cluster shared configuration pushed by the hub.
    SharedConfig { config: Value },
}
