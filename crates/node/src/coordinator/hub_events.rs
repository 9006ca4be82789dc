// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub event handling: the inbound half of the coordinator.

use ch_core::{ChatRole, Clock, FanoutEvent, NodeEventKind};
use ch_wire::{ChatPayload, ChatWireRole};
use serde_json::Value;
use std::sync::atomic::Ordering;

use super::Coordinator;
use crate::agent::AgentBridge;
use crate::hub::HubEvent;

pub(super) async fn handle<B, C>(coordinator: &Coordinator<B, C>, event: HubEvent)
where
    B: AgentBridge,
    C: Clock,
{
    let inner = &coordinator.inner;
    match event {
        HubEvent::Connected => {
            tracing::info!("hub session established");
        }

        HubEvent::Disconnected => {
            tracing::info!("hub session lost");
        }

        HubEvent::TaskReceived { task_id, from, payload } => {
            inner
                .queue
                .enqueue(&task_id, &from, &payload.task, payload.priority, payload.config.as_ref())
                .await;
        }

        HubEvent::TaskStatusUpdate { task_id, status, position } => {
            if let Some(position) = position {
                tracing::debug!(task = %task_id, position, "task queued on peer");
            }
            let now = inner.clock.epoch_ms();
            // The store discards regressions, so late or re-ordered frames
            // fall out here.
            if let Some(task) = inner.stores.tasks.update_status(&task_id, status, now) {
                coordinator.emit_task_update(task);
            }
        }

        HubEvent::TaskResult { task_id, payload } => {
            let now = inner.clock.epoch_ms();
            if let Some(task) = inner.stores.tasks.record_result(
                &task_id,
                payload.success,
                payload.result,
                payload.error,
                now,
            ) {
                coordinator.emit_task_update(task);
            }
        }

        HubEvent::TaskCancelRequested { task_id, from, reason } => {
            tracing::info!(task = %task_id, ?from, ?reason, "peer requested cancellation");
            if !inner.queue.cancel(&task_id).await {
                tracing::debug!(task = %task_id, "nothing to cancel");
            }
        }

        HubEvent::ChatFrame { frame } => {
            let Some(payload) = frame.payload_as::<ChatPayload>() else {
                tracing::debug!(id = %frame.id, "malformed chat payload, dropped");
                return;
            };
            match payload.role {
                ChatWireRole::User => inner.chat.handle_user_chat(frame),
                ChatWireRole::Assistant => {
                    let Some(from) = frame.from else { return };
                    let text = reply_text(&payload);
                    let now = inner.clock.epoch_ms();
                    let message =
                        inner.stores.chats.append(&from, ChatRole::Assistant, text, now);
                    inner.fanout.emit(FanoutEvent::ChatMessage { node_id: from, message });
                }
                // Intermediate deltas stay transient; the presenter renders
                // the final reply from the store.
                ChatWireRole::Delta => {}
            }
        }

        HubEvent::NodeOnline { node_id } => {
            record_lifecycle(coordinator, &node_id, NodeEventKind::Online);
        }

        HubEvent::NodeOffline { node_id } => {
            record_lifecycle(coordinator, &node_id, NodeEventKind::Offline);
        }

        HubEvent::TopologyChanged { action, node_id } => {
            let kind = match action.as_str() {
                "child_registered" | "child_arrived" => Some(NodeEventKind::Registered),
                "child_unregistered" | "child_departed" => Some(NodeEventKind::Departed),
                // Reparents reshape the tree without membership change.
                _ => None,
            };
            match (kind, node_id) {
                (Some(kind), Some(node_id)) => record_lifecycle(coordinator, &node_id, kind),
                _ => tracing::debug!(action = %action, "topology change without event mapping"),
            }
        }

        HubEvent::SharedConfig { config } => {
            apply_shared_config(coordinator, config);
        }
    }
}

fn record_lifecycle<B, C>(coordinator: &Coordinator<B, C>, node_id: &str, kind: NodeEventKind)
where
    B: AgentBridge,
    C: Clock,
{
    let inner = &coordinator.inner;
    let now = inner.clock.epoch_ms();
    let event = inner.stores.node_events.record(node_id, None, kind, now);
    inner.fanout.emit(FanoutEvent::NodeEvent { event });
}

/// Adopt a pushed shared config. Connector registration behind the push is
/// one-shot: a second push only refreshes the stored value.
fn apply_shared_config<B, C>(coordinator: &Coordinator<B, C>, config: Value)
where
    B: AgentBridge,
    C: Clock,
{
    let inner = &coordinator.inner;
    *inner.shared_config.lock() = Some(config);
    if !inner.connectors_latched.swap(true, Ordering::SeqCst) {
        tracing::info!("shared config received, cluster connectors enabled");
    } else {
        tracing::debug!("shared config refreshed");
    }
}

/// Flatten an assistant reply to text for the chat store.
fn reply_text(payload: &ChatPayload) -> String {
    if let Some(content) = payload.content.as_ref() {
        return content.clone();
    }
    let Some(messages) = payload.messages.as_ref() else {
        return String::new();
    };
    let mut acc = String::new();
    for entry in messages {
        let text = match &entry.content {
            Value::String(s) => s.clone(),
            other => crate::agent::reduce_content(other),
        };
        if text.is_empty() {
            continue;
        }
        if !acc.is_empty() {
            acc.push('\n');
        }
        acc.push_str(&text);
    }
    acc
}
