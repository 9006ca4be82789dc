// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator tests: verb dispatch and hub event handling against fake
//! bridge, fake clock, and tempdir stores. REST verbs that need a live hub
//! are exercised only up to their local effects.

use super::*;
use crate::agent::FakeAgentBridge;
use ch_core::{FakeClock, NodeEventKind, ReceivedStatus};
use ch_wire::FrameType;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

struct Harness {
    coordinator: Coordinator<FakeAgentBridge, FakeClock>,
    runtime: CoordinatorRuntime,
    bridge: FakeAgentBridge,
    clock: FakeClock,
    stores: Stores,
    fanout_rx: mpsc::Receiver<FanoutEvent>,
    config_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn registered_config() -> NodeConfig {
    let mut config = NodeConfig {
        hub_url: "https://hub.invalid".into(),
        node_name: "alpha".into(),
        ..Default::default()
    };
    config.node_id = Some("self-node".into());
    config.cluster_id = Some("cluster-1".into());
    config.token = Some("tok".into());
    config
}

fn harness_with(config: NodeConfig, bridge: FakeAgentBridge) -> Harness {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("openclaw.json");
    let stores = Stores::open_with_debounce(&dir.path().join("hub-data"), Duration::from_secs(60));
    let clock = FakeClock::new();
    let (coordinator, runtime) = Coordinator::new(
        config,
        config_path.clone(),
        stores.clone(),
        Arc::new(bridge.clone()),
        clock.clone(),
    );
    let (fanout_tx, fanout_rx) = mpsc::channel(64);
    coordinator.fanout().attach(fanout_tx);
    Harness { coordinator, runtime, bridge, clock, stores, fanout_rx, config_path, _dir: dir }
}

fn harness() -> Harness {
    harness_with(registered_config(), FakeAgentBridge::new())
}

async fn next_fanout(harness: &mut Harness) -> FanoutEvent {
    tokio::time::timeout(Duration::from_secs(1), harness.fanout_rx.recv())
        .await
        .expect("timed out waiting for fanout event")
        .expect("fanout channel closed")
}

#[tokio::test]
async fn ping_pongs() {
    let harness = harness();
    assert_eq!(harness.coordinator.dispatch(Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn status_combines_hub_queue_and_store() {
    let harness = harness();
    let Response::Status { status } = harness.coordinator.dispatch(Request::Status).await else {
        panic!("expected status");
    };
    assert!(status.hub.registered);
    assert!(!status.hub.connected);
    assert_eq!(status.queue.max_concurrent, 3);
    assert_eq!(status.sent_tasks.total, 0);
}

#[tokio::test]
async fn task_send_remote_records_and_fans_out() {
    let mut harness = harness();

    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "peer-1".into(), instruction: "ls".into() })
        .await
    else {
        panic!("expected task");
    };

    assert_eq!(task.source, TaskSource::Remote);
    assert_eq!(task.status, TaskStatus::Sent);
    assert_eq!(task.target_node_id, "peer-1");
    assert!(harness.stores.tasks.get(&task.task_id).is_some());

    match next_fanout(&mut harness).await {
        FanoutEvent::TaskUpdate { task: update } => assert_eq!(update.task_id, task.task_id),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn self_task_in_local_mode_runs_on_the_agent() {
    let mut harness = harness_with(registered_config(), FakeAgentBridge::new().auto_complete());

    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "self-node".into(), instruction: "think".into() })
        .await
    else {
        panic!("expected task");
    };
    assert_eq!(task.source, TaskSource::Local);
    assert_eq!(task.target_node_name.as_deref(), Some("alpha"));

    // Sent update, then the terminal update from the loopback run
    let _sent = next_fanout(&mut harness).await;
    let FanoutEvent::TaskUpdate { task: done } = next_fanout(&mut harness).await else {
        panic!("expected task update");
    };
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("(no output)"));

    // The loopback run went through the task session convention
    assert_eq!(
        harness.bridge.submits()[0].session_key,
        format!("agent:main:hub-task:{}", task.task_id)
    );
}

#[tokio::test]
async fn self_task_in_hub_mode_goes_out_as_a_frame() {
    let mut config = registered_config();
    config.self_task_mode = SelfTaskMode::Hub;
    let harness = harness_with(config, FakeAgentBridge::new());

    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "self-node".into(), instruction: "x".into() })
        .await
    else {
        panic!("expected task");
    };
    assert_eq!(task.source, TaskSource::Remote);
    assert!(harness.bridge.submits().is_empty());
}

#[tokio::test]
async fn task_get_unknown_is_an_error() {
    let harness = harness();
    let response = harness.coordinator.dispatch(Request::TaskGet { task_id: "nope".into() }).await;
    let Response::Error { message } = response else { panic!("expected error") };
    assert!(message.contains("task not found"));
}

#[tokio::test]
async fn task_list_rejects_unknown_status_filter() {
    let harness = harness();
    let response = harness
        .coordinator
        .dispatch(Request::TaskList { node_id: None, status: Some("melted".into()), limit: None })
        .await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn cancel_of_sent_task_marks_cancelled() {
    let mut harness = harness();
    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "peer-1".into(), instruction: "ls".into() })
        .await
    else {
        panic!("expected task");
    };
    let _sent = next_fanout(&mut harness).await;

    let Response::TaskCancelled { cancelled } = harness
        .coordinator
        .dispatch(Request::TaskCancel { task_id: task.task_id.clone() })
        .await
    else {
        panic!("expected cancel result");
    };
    assert!(cancelled);
    assert_eq!(harness.stores.tasks.get(&task.task_id).unwrap().status, TaskStatus::Cancelled);

    // Cancelling a terminal task is a no-op
    let Response::TaskCancelled { cancelled } = harness
        .coordinator
        .dispatch(Request::TaskCancel { task_id: task.task_id.clone() })
        .await
    else {
        panic!("expected cancel result");
    };
    assert!(!cancelled);
}

#[tokio::test]
async fn status_frames_advance_and_regressions_drop() {
    let harness = harness();
    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "peer-1".into(), instruction: "ls".into() })
        .await
    else {
        panic!("expected task");
    };

    harness
        .coordinator
        .handle_hub_event(HubEvent::TaskStatusUpdate {
            task_id: task.task_id.clone(),
            status: TaskStatus::Running,
            position: None,
        })
        .await;
    assert_eq!(harness.stores.tasks.get(&task.task_id).unwrap().status, TaskStatus::Running);

    // Late queued frame regresses and is discarded
    harness
        .coordinator
        .handle_hub_event(HubEvent::TaskStatusUpdate {
            task_id: task.task_id.clone(),
            status: TaskStatus::Queued,
            position: Some(1),
        })
        .await;
    assert_eq!(harness.stores.tasks.get(&task.task_id).unwrap().status, TaskStatus::Running);

    harness.clock.advance(Duration::from_millis(1_200));
    harness
        .coordinator
        .handle_hub_event(HubEvent::TaskResult {
            task_id: task.task_id.clone(),
            payload: ch_wire::ResultPayload::ok("done"),
        })
        .await;
    let stored = harness.stores.tasks.get(&task.task_id).unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.duration_ms, Some(1_200));
}

#[tokio::test]
async fn task_clear_via_verbs_is_idempotent() {
    let harness = harness();
    let Response::TaskSent { task } = harness
        .coordinator
        .dispatch(Request::TaskSend { node_id: "peer-1".into(), instruction: "ls".into() })
        .await
    else {
        panic!("expected task");
    };
    harness
        .coordinator
        .handle_hub_event(HubEvent::TaskResult {
            task_id: task.task_id,
            payload: ch_wire::ResultPayload::ok("done"),
        })
        .await;

    let now = harness.clock.epoch_ms();
    let Response::TasksCleared { cleared } =
        harness.coordinator.dispatch(Request::TaskClear { before: Some(now + 1) }).await
    else {
        panic!("expected cleared");
    };
    assert_eq!(cleared, 1);

    let Response::TasksCleared { cleared } =
        harness.coordinator.dispatch(Request::TaskClear { before: Some(now + 1) }).await
    else {
        panic!("expected cleared");
    };
    assert_eq!(cleared, 0);
}

#[tokio::test]
async fn task_batch_records_every_task() {
    let harness = harness();
    let Response::TasksSent { tasks } = harness
        .coordinator
        .dispatch(Request::TaskBatch {
            tasks: vec![
                crate::protocol::TaskSpec { node_id: "a".into(), instruction: "x".into() },
                crate::protocol::TaskSpec { node_id: "b".into(), instruction: "y".into() },
            ],
        })
        .await
    else {
        panic!("expected batch reply");
    };
    assert_eq!(tasks.len(), 2);
    assert_eq!(harness.stores.tasks.summary().total, 2);
}

#[tokio::test]
async fn inbound_task_lands_in_the_queue() {
    let mut harness = harness_with(registered_config(), FakeAgentBridge::new().auto_complete());

    harness
        .coordinator
        .handle_hub_event(HubEvent::TaskReceived {
            task_id: "t-in".into(),
            from: "peer-1".into(),
            payload: ch_wire::TaskPayload {
                task: "echo hi".into(),
                priority: Default::default(),
                config: None,
            },
        })
        .await;

    // Running ack goes back out through the frame channel
    let ack = tokio::time::timeout(Duration::from_secs(1), harness.runtime.frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.kind, FrameType::TaskAck);
    assert_eq!(ack.id, "t-in");
    assert_eq!(ack.to.as_deref(), Some("peer-1"));

    let result = tokio::time::timeout(Duration::from_secs(1), harness.runtime.frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.kind, FrameType::Result);
    assert_eq!(harness.stores.received.get("t-in").unwrap().status, ReceivedStatus::Completed);
}

#[tokio::test]
async fn inbound_user_chat_reaches_the_agent() {
    let harness = harness();
    let frame = Frame::decode(
        &json!({
            "type": "chat", "id": "chat-1", "from": "peer-1",
            "payload": { "role": "user", "content": "hello", "timestamp": 1 }
        })
        .to_string(),
    )
    .unwrap();

    harness.coordinator.handle_hub_event(HubEvent::ChatFrame { frame }).await;
    tokio::task::yield_now().await;

    let submits = harness.bridge.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].session_key, "hub-chat:peer-1");
}

#[tokio::test]
async fn peer_assistant_reply_is_persisted_and_fanned_out() {
    let mut harness = harness();
    let frame = Frame::decode(
        &json!({
            "type": "chat", "id": "chat-9", "from": "peer-1",
            "payload": {
                "role": "assistant", "done": true, "timestamp": 2,
                "messages": [
                    { "role": "assistant", "content": "part one", "timestamp": 1 },
                    { "role": "assistant", "content": "part two", "timestamp": 2 },
                ]
            }
        })
        .to_string(),
    )
    .unwrap();

    harness.coordinator.handle_hub_event(HubEvent::ChatFrame { frame }).await;

    let history = harness.stores.chats.history("peer-1", None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, ChatRole::Assistant);
    assert_eq!(history[0].content, "part one\npart two");

    match next_fanout(&mut harness).await {
        FanoutEvent::ChatMessage { node_id, .. } => assert_eq!(node_id, "peer-1"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn chat_send_persists_user_message() {
    let mut harness = harness();
    let Response::ChatSent { message } = harness
        .coordinator
        .dispatch(Request::ChatSend {
            node_id: "peer-1".into(),
            content: "hi there".into(),
            whole: None,
            auto_refresh_ms: Some(500),
        })
        .await
    else {
        panic!("expected chat reply");
    };
    assert_eq!(message.role, ChatRole::User);

    let Response::ChatMessages { messages } = harness
        .coordinator
        .dispatch(Request::ChatHistory { node_id: "peer-1".into(), limit: None })
        .await
    else {
        panic!("expected history");
    };
    assert_eq!(messages, vec![message.clone()]);

    match next_fanout(&mut harness).await {
        FanoutEvent::ChatMessage { message: event_message, .. } => {
            assert_eq!(event_message, message)
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn lifecycle_events_feed_the_ring_and_the_verb() {
    let mut harness = harness();

    harness.coordinator.handle_hub_event(HubEvent::NodeOnline { node_id: "n-1".into() }).await;
    harness.coordinator.handle_hub_event(HubEvent::NodeOffline { node_id: "n-1".into() }).await;
    harness
        .coordinator
        .handle_hub_event(HubEvent::TopologyChanged {
            action: "child_departed".into(),
            node_id: Some("n-2".into()),
        })
        .await;

    let Response::NodeEvents { events } =
        harness.coordinator.dispatch(Request::NodeEvents { limit: None }).await
    else {
        panic!("expected events");
    };
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event, NodeEventKind::Departed);
    assert_eq!(events[2].event, NodeEventKind::Online);

    for _ in 0..3 {
        assert!(matches!(next_fanout(&mut harness).await, FanoutEvent::NodeEvent { .. }));
    }
}

#[tokio::test]
async fn shared_config_push_latches_connectors_once() {
    let harness = harness();

    harness
        .coordinator
        .handle_hub_event(HubEvent::SharedConfig { config: json!({ "owner": "ops" }) })
        .await;
    assert!(harness.coordinator.inner.connectors_latched.load(Ordering::SeqCst));
    assert_eq!(
        harness.coordinator.inner.shared_config.lock().clone(),
        Some(json!({ "owner": "ops" }))
    );

    // Second push refreshes the value; the latch stays set
    harness
        .coordinator
        .handle_hub_event(HubEvent::SharedConfig { config: json!({ "owner": "ops2" }) })
        .await;
    assert!(harness.coordinator.inner.connectors_latched.load(Ordering::SeqCst));
    assert_eq!(
        harness.coordinator.inner.shared_config.lock().clone(),
        Some(json!({ "owner": "ops2" }))
    );
}

#[tokio::test]
async fn config_set_patches_saves_and_resizes() {
    let harness = harness();

    let Response::Config { config } = harness
        .coordinator
        .dispatch(Request::ConfigSet { patch: json!({ "maxConcurrent": 7 }) })
        .await
    else {
        panic!("expected config");
    };
    assert_eq!(config.max_concurrent, 7);
    // Untouched fields survive the merge
    assert_eq!(config.node_id.as_deref(), Some("self-node"));

    let on_disk = crate::config_file::load(&harness.config_path);
    assert_eq!(on_disk.max_concurrent, 7);

    let Response::Status { status } = harness.coordinator.dispatch(Request::Status).await else {
        panic!("expected status");
    };
    assert_eq!(status.queue.max_concurrent, 7);
}

#[tokio::test]
async fn config_set_rejects_bad_patch() {
    let harness = harness();
    let response = harness
        .coordinator
        .dispatch(Request::ConfigSet { patch: json!({ "maxConcurrent": "lots" }) })
        .await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn unregistered_node_cannot_use_identity_verbs() {
    let config = NodeConfig { hub_url: "https://hub.invalid".into(), ..Default::default() };
    let harness = harness_with(config, FakeAgentBridge::new());

    let Response::Error { message } = harness.coordinator.dispatch(Request::Tree).await else {
        panic!("expected error");
    };
    assert!(message.contains("not registered"));

    let Response::Error { message } =
        harness.coordinator.dispatch(Request::Unregister { node_id: None }).await
    else {
        panic!("expected error");
    };
    assert!(message.contains("not registered"));
}
