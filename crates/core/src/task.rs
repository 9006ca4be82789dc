// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records: outbound (sent to a peer) and inbound (received for local
//! execution).
//!
//! Persisted and wire-visible structs serialize camelCase to match the hub
//! JSON contract.

use serde::{Deserialize, Serialize};

/// Where an outbound task originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    /// Self-targeted task executed against the local agent.
    Local,
    /// Task dispatched to a peer over the hub.
    Remote,
}

/// Status of an outbound task as reported back by the target node.
///
/// Transitions are monotonically non-regressing along
/// `sent < queued < running < terminal`; see [`TaskStatus::accepts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Sent,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Sent => 0,
            TaskStatus::Queued => 1,
            TaskStatus::Running => 2,
            TaskStatus::Completed
            | TaskStatus::Failed
            | TaskStatus::Cancelled
            | TaskStatus::Timeout => 3,
        }
    }

    /// Whether a transition from `self` to `next` respects the status order.
    ///
    /// Terminal states accept only themselves (re-applying the same terminal
    /// frame is idempotent); everything else accepts any same-or-later rank.
    pub fn accepts(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }

    /// Parse a wire status string. Unknown strings yield `None` so the frame
    /// can be dropped at the protocol boundary.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "sent" => Some(TaskStatus::Sent),
            "queued" => Some(TaskStatus::Queued),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            "timeout" => Some(TaskStatus::Timeout),
            _ => None,
        }
    }
}

/// A task this node sent to a peer (or to itself in local mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTask {
    pub task_id: String,
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_name: Option<String>,
    pub instruction: String,
    pub source: TaskSource,
    pub status: TaskStatus,
    pub sent_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acked_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StoredTask {
    pub fn new(
        task_id: impl Into<String>,
        target_node_id: impl Into<String>,
        instruction: impl Into<String>,
        source: TaskSource,
        sent_at: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            target_node_id: target_node_id.into(),
            target_node_name: None,
            instruction: instruction.into(),
            source,
            status: TaskStatus::Sent,
            sent_at,
            acked_at: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// Priority carried on inbound tasks. Informational: the local queue is
/// strictly FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Status of an inbound task in the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceivedStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ReceivedStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReceivedStatus::Completed | ReceivedStatus::Failed | ReceivedStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            ReceivedStatus::Queued => 0,
            ReceivedStatus::Running => 1,
            ReceivedStatus::Completed | ReceivedStatus::Failed | ReceivedStatus::Cancelled => 2,
        }
    }

    /// Same non-regression rule as [`TaskStatus::accepts`].
    pub fn accepts(&self, next: ReceivedStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

/// A task received from a peer for execution on the local agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedTask {
    pub task_id: String,
    pub from_node_id: String,
    pub instruction: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: ReceivedStatus,
    pub received_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    /// Agent session handle; used to cancel a running run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReceivedTask {
    pub fn new(
        task_id: impl Into<String>,
        from_node_id: impl Into<String>,
        instruction: impl Into<String>,
        priority: TaskPriority,
        received_at: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            from_node_id: from_node_id.into(),
            instruction: instruction.into(),
            priority,
            status: ReceivedStatus::Queued,
            received_at,
            started_at: None,
            completed_at: None,
            session_key: None,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
