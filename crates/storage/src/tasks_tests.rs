// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ch_core::TaskSource;
use std::time::Duration;
use tempfile::tempdir;

fn store(dir: &tempfile::TempDir) -> TaskStore {
    TaskStore::open(dir.path().join("tasks.json"), Duration::from_millis(10))
}

fn sent(id: &str, at: u64) -> StoredTask {
    StoredTask::new(id, "node-b", "echo hi", TaskSource::Remote, at)
}

#[test]
fn record_and_get() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);

    tasks.record_sent(sent("t-1", 100));

    let task = tasks.get("t-1").unwrap();
    assert_eq!(task.status, TaskStatus::Sent);
    assert_eq!(task.sent_at, 100);
    assert!(tasks.get("t-2").is_none());
}

#[test]
fn newest_first_and_capped() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);

    for i in 0..(SENT_TASK_CAP + 1) {
        tasks.record_sent(sent(&format!("t-{}", i), i as u64));
    }

    let all = tasks.list(&TaskFilter::default());
    assert_eq!(all.len(), SENT_TASK_CAP);
    // Newest at the front, oldest ("t-0") evicted
    assert_eq!(all[0].task_id, format!("t-{}", SENT_TASK_CAP));
    assert!(tasks.get("t-0").is_none());
}

#[test]
fn update_status_stamps_ack_and_start() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-1", 100));

    let task = tasks.update_status("t-1", TaskStatus::Queued, 150).unwrap();
    assert_eq!(task.acked_at, Some(150));
    assert_eq!(task.started_at, None);

    let task = tasks.update_status("t-1", TaskStatus::Running, 200).unwrap();
    // First ack stamp is preserved
    assert_eq!(task.acked_at, Some(150));
    assert_eq!(task.started_at, Some(200));
}

#[test]
fn regressing_status_is_discarded() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-1", 100));
    tasks.update_status("t-1", TaskStatus::Running, 200);

    assert!(tasks.update_status("t-1", TaskStatus::Queued, 250).is_none());
    assert_eq!(tasks.get("t-1").unwrap().status, TaskStatus::Running);

    // Terminal state rejects everything but itself
    tasks.record_result("t-1", true, Some("out".into()), None, 300);
    assert!(tasks.update_status("t-1", TaskStatus::Failed, 350).is_none());
    assert_eq!(tasks.get("t-1").unwrap().status, TaskStatus::Completed);
}

#[test]
fn record_result_derives_duration() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-1", 1_000));

    let task = tasks.record_result("t-1", false, None, Some("boom".into()), 4_500).unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.completed_at, Some(4_500));
    assert_eq!(task.duration_ms, Some(3_500));
    assert_eq!(task.error.as_deref(), Some("boom"));
}

#[test]
fn list_filters_by_node_status_and_limit() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(StoredTask::new("t-1", "node-a", "x", TaskSource::Remote, 1));
    tasks.record_sent(StoredTask::new("t-2", "node-b", "y", TaskSource::Remote, 2));
    tasks.record_sent(StoredTask::new("t-3", "node-b", "z", TaskSource::Local, 3));
    tasks.update_status("t-2", TaskStatus::Running, 10);

    let by_node = tasks.list(&TaskFilter { node_id: Some("node-b".into()), ..Default::default() });
    assert_eq!(by_node.len(), 2);

    let by_status =
        tasks.list(&TaskFilter { status: Some(TaskStatus::Running), ..Default::default() });
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0].task_id, "t-2");

    let limited = tasks.list(&TaskFilter { limit: Some(1), ..Default::default() });
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].task_id, "t-3");
}

#[test]
fn summary_counts_by_status() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-1", 1));
    tasks.record_sent(sent("t-2", 2));
    tasks.record_result("t-2", true, None, None, 5);

    let summary = tasks.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
}

#[test]
fn clear_completed_is_idempotent() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-1", 1));
    tasks.record_sent(sent("t-2", 2));
    tasks.record_result("t-1", true, None, None, 10);

    assert_eq!(tasks.clear_completed(None), 1);
    // Second sweep has nothing left to clear
    assert_eq!(tasks.clear_completed(None), 0);
    // Non-terminal task survives
    assert!(tasks.get("t-2").is_some());
}

#[test]
fn clear_completed_respects_cutoff() {
    let dir = tempdir().unwrap();
    let tasks = store(&dir);
    tasks.record_sent(sent("t-old", 1));
    tasks.record_sent(sent("t-new", 2));
    tasks.record_result("t-old", true, None, None, 100);
    tasks.record_result("t-new", true, None, None, 900);

    assert_eq!(tasks.clear_completed(Some(500)), 1);
    assert!(tasks.get("t-old").is_none());
    assert!(tasks.get("t-new").is_some());
}

#[test]
fn flush_then_reopen_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    {
        let tasks = TaskStore::open(path.clone(), Duration::from_secs(60));
        tasks.record_sent(sent("t-1", 100));
        tasks.update_status("t-1", TaskStatus::Running, 200);
        tasks.flush();
    }

    let tasks = TaskStore::open(path, Duration::from_secs(60));
    let task = tasks.get("t-1").unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.started_at, Some(200));
}

#[test]
fn open_with_missing_or_corrupt_file_is_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.json");

    let tasks = TaskStore::open(path.clone(), Duration::from_secs(60));
    assert_eq!(tasks.summary().total, 0);

    std::fs::write(&path, b"][").unwrap();
    let tasks = TaskStore::open(path, Duration::from_secs(60));
    assert_eq!(tasks.summary().total, 0);
}

#[tokio::test]
async fn debounce_coalesces_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    let tasks = TaskStore::open(path.clone(), Duration::from_millis(30));

    for i in 0..10 {
        tasks.record_sent(sent(&format!("t-{}", i), i));
    }
    // Nothing hits disk inside the debounce window
    assert!(!path.exists());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(path.exists());

    let file: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(file["tasks"].as_array().unwrap().len(), 10);
    assert_eq!(file["version"], 1);
}
