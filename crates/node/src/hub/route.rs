// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound frame routing.
//!
//! Pure translation from wire frames to [`HubEvent`]s, plus the two side
//! effects lifecycle broadcasts carry: bumping the change sequence and
//! invalidating the node cache. Unknown or malformed frames are dropped at
//! debug level.

use ch_core::TaskStatus;
use ch_wire::{
    parse_system_broadcast, AckStatus, DirectPayload, Frame, FrameType, SystemBroadcast,
    TaskAckPayload, TaskStatusPayload,
};

use super::events::HubEvent;
use super::HubShared;

pub(crate) fn route_frame(frame: Frame, shared: &HubShared) -> Vec<HubEvent> {
    match frame.kind {
        FrameType::Task => {
            let Some(from) = frame.from.clone() else {
                tracing::debug!(task = %frame.id, "task frame without sender, dropped");
                return vec![];
            };
            match frame.payload_as() {
                Some(payload) => {
                    vec![HubEvent::TaskReceived { task_id: frame.id, from, payload }]
                }
                None => {
                    tracing::debug!(task = %frame.id, "malformed task payload, dropped");
                    vec![]
                }
            }
        }

        FrameType::TaskAck => match frame.payload_as::<TaskAckPayload>() {
            Some(payload) => {
                let status = match payload.status {
                    AckStatus::Queued => TaskStatus::Queued,
                    AckStatus::Running => TaskStatus::Running,
                };
                vec![HubEvent::TaskStatusUpdate {
                    task_id: frame.id,
                    status,
                    position: payload.position,
                }]
            }
            None => {
                tracing::debug!(task = %frame.id, "malformed task_ack payload, dropped");
                vec![]
            }
        },

        // The hub reuses the ack vocabulary for intermediate status frames;
        // the store's monotonic guard makes out-of-order delivery safe.
        FrameType::TaskStatus => match frame.payload_as::<TaskStatusPayload>() {
            Some(payload) => match TaskStatus::parse(&payload.status) {
                Some(status) => {
                    vec![HubEvent::TaskStatusUpdate { task_id: frame.id, status, position: None }]
                }
                None => {
                    tracing::debug!(
                        task = %frame.id,
                        status = %payload.status,
                        "unknown task_status value, dropped"
                    );
                    vec![]
                }
            },
            None => vec![],
        },

        FrameType::TaskCancel => {
            let reason = frame
                .payload_as::<ch_wire::TaskCancelPayload>()
                .and_then(|p| p.reason);
            vec![HubEvent::TaskCancelRequested { task_id: frame.id, from: frame.from, reason }]
        }

        FrameType::Result => match frame.payload_as() {
            Some(payload) => vec![HubEvent::TaskResult { task_id: frame.id, payload }],
            None => {
                tracing::debug!(task = %frame.id, "malformed result payload, dropped");
                vec![]
            }
        },

        FrameType::Chat => vec![HubEvent::ChatFrame { frame }],

        FrameType::Broadcast => {
            if frame.channel.as_deref() != Some("system") {
                return vec![];
            }
            match parse_system_broadcast(&frame.payload) {
                Some(broadcast) => {
                    shared.invalidate_node_cache();
                    shared.bump_change_seq();
                    match broadcast {
                        SystemBroadcast::NodeOnline { node_id } => {
                            vec![HubEvent::NodeOnline { node_id }]
                        }
                        SystemBroadcast::NodeOffline { node_id } => {
                            vec![HubEvent::NodeOffline { node_id }]
                        }
                        SystemBroadcast::Topology { action, node_id } => {
                            vec![HubEvent::TopologyChanged { action, node_id }]
                        }
                    }
                }
                None => {
                    tracing::debug!("unknown system broadcast, dropped");
                    vec![]
                }
            }
        }

        FrameType::Direct => match frame.payload_as::<DirectPayload>() {
            Some(payload) => {
                if payload.action == "connected" {
                    tracing::info!(node = ?payload.node_id, "hub acknowledged connection");
                }
                match payload.shared_config {
                    Some(config) => vec![HubEvent::SharedConfig { config }],
                    None => vec![],
                }
            }
            None => vec![],
        },

        // Server heartbeat replies carry nothing we track.
        FrameType::Heartbeat | FrameType::Subscribe => vec![],
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
