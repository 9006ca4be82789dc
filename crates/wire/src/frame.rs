// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame envelope and constructors.

use crate::payload::{
    ChatPayload, HeartbeatPayload, ResultPayload, TaskAckPayload, TaskCancelPayload, TaskPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Task,
    Result,
    TaskAck,
    TaskStatus,
    TaskCancel,
    Chat,
    Direct,
    Broadcast,
    Heartbeat,
    Subscribe,
}

/// One hub WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Frame {
    fn envelope(kind: FrameType, id: String, to: Option<String>, payload: Value) -> Self {
        Self { kind, id, from: None, to, channel: None, payload, timestamp: None }
    }

    /// Dispatch a task to `to`. The frame id is the task id.
    pub fn task(task_id: &str, to: &str, payload: &TaskPayload) -> Self {
        Self::envelope(FrameType::Task, task_id.into(), Some(to.into()), to_value(payload))
    }

    /// Acknowledge a received task back to its sender.
    pub fn task_ack(task_id: &str, to: &str, payload: &TaskAckPayload) -> Self {
        Self::envelope(FrameType::TaskAck, task_id.into(), Some(to.into()), to_value(payload))
    }

    /// Request cancellation of a task previously sent to `to`.
    pub fn task_cancel(task_id: &str, to: &str, payload: &TaskCancelPayload) -> Self {
        Self::envelope(FrameType::TaskCancel, task_id.into(), Some(to.into()), to_value(payload))
    }

    /// Report a terminal task outcome to its sender.
    pub fn result(task_id: &str, to: &str, payload: &ResultPayload) -> Self {
        Self::envelope(FrameType::Result, task_id.into(), Some(to.into()), to_value(payload))
    }

    /// Chat frame with a fresh message id.
    pub fn chat(to: &str, payload: &ChatPayload) -> Self {
        Self::envelope(FrameType::Chat, ch_core::new_uuid(), Some(to.into()), to_value(payload))
    }

    /// Heartbeat frame. The hub ignores the id; a fresh UUID keeps the
    /// envelope uniform.
    pub fn heartbeat(payload: &HeartbeatPayload) -> Self {
        Self::envelope(FrameType::Heartbeat, ch_core::new_uuid(), None, to_value(payload))
    }

    /// Deserialize the payload as `T`. `None` means the frame should be
    /// dropped at the protocol boundary.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

fn to_value<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
