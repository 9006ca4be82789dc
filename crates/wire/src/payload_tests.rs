// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn ack_payload_shapes() {
    let queued = TaskAckPayload::queued(1);
    let json = serde_json::to_value(&queued).unwrap();
    assert_eq!(json, json!({ "status": "queued", "position": 1 }));

    let running = TaskAckPayload::running();
    let json = serde_json::to_value(&running).unwrap();
    assert_eq!(json, json!({ "status": "running" }));
}

#[test]
fn task_payload_defaults() {
    let payload: TaskPayload = serde_json::from_value(json!({ "task": "echo hi" })).unwrap();
    assert_eq!(payload.priority, ch_core::TaskPriority::Normal);
    assert!(payload.config.is_none());

    let payload: TaskPayload = serde_json::from_value(json!({
        "task": "echo hi",
        "priority": "high",
        "config": { "maxConcurrent": 2 }
    }))
    .unwrap();
    assert_eq!(payload.priority, ch_core::TaskPriority::High);
    assert_eq!(payload.config.unwrap().max_concurrent, Some(2));
}

#[test]
fn chat_payload_field_names_are_camel_case() {
    let payload = ChatPayload::assistant_done(
        vec![ChatEntry { role: "assistant".into(), content: json!("hi"), timestamp: Some(3) }],
        "orig-id",
        9,
    );
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["replyTo"], "orig-id");
    assert_eq!(json["done"], true);
    assert_eq!(json["role"], "assistant");

    let config: ChatConfig =
        serde_json::from_value(json!({ "whole": true, "autoRefreshMs": 500 })).unwrap();
    assert!(config.whole);
    assert_eq!(config.auto_refresh_ms, Some(500));
}

#[test]
fn delta_payload_is_not_done() {
    let payload = ChatPayload::delta(vec![], "orig", 1);
    assert_eq!(payload.role, ChatWireRole::Delta);
    assert_eq!(payload.done, Some(false));
}

#[test]
fn heartbeat_payload_round_trip() {
    let payload = HeartbeatPayload { load: 0.0, active_tasks: 3 };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json, json!({ "load": 0.0, "activeTasks": 3 }));
}

#[test]
fn system_broadcast_parses_lifecycle_actions() {
    let online = parse_system_broadcast(&json!({ "action": "node_online", "nodeId": "n-1" }));
    assert_eq!(online, Some(SystemBroadcast::NodeOnline { node_id: "n-1".into() }));

    let offline = parse_system_broadcast(&json!({ "action": "node_offline", "nodeId": "n-1" }));
    assert_eq!(offline, Some(SystemBroadcast::NodeOffline { node_id: "n-1".into() }));

    let reparented = parse_system_broadcast(&json!({ "action": "reparented" }));
    assert_eq!(
        reparented,
        Some(SystemBroadcast::Topology { action: "reparented".into(), node_id: None })
    );
}

#[test]
fn system_broadcast_drops_unknown_or_incomplete() {
    assert_eq!(parse_system_broadcast(&json!({ "action": "weather_report" })), None);
    // node_online without a node id is not actionable
    assert_eq!(parse_system_broadcast(&json!({ "action": "node_online" })), None);
    assert_eq!(parse_system_broadcast(&json!({})), None);
}

#[test]
fn direct_payload_surfaces_shared_config() {
    let payload: DirectPayload = serde_json::from_value(json!({
        "action": "connected",
        "nodeId": "n-1",
        "sharedConfig": { "owner": "ops@example" }
    }))
    .unwrap();
    assert_eq!(payload.action, "connected");
    assert_eq!(payload.shared_config.unwrap()["owner"], "ops@example");
}
