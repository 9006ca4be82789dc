// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_order_is_non_regressing() {
    assert!(TaskStatus::Sent.accepts(TaskStatus::Queued));
    assert!(TaskStatus::Queued.accepts(TaskStatus::Running));
    assert!(TaskStatus::Running.accepts(TaskStatus::Completed));
    assert!(TaskStatus::Sent.accepts(TaskStatus::Failed));

    // Same rank re-applies fine
    assert!(TaskStatus::Running.accepts(TaskStatus::Running));

    // Regressions are rejected
    assert!(!TaskStatus::Running.accepts(TaskStatus::Queued));
    assert!(!TaskStatus::Queued.accepts(TaskStatus::Sent));
}

#[test]
fn terminal_status_accepts_only_itself() {
    assert!(TaskStatus::Completed.accepts(TaskStatus::Completed));
    assert!(!TaskStatus::Completed.accepts(TaskStatus::Failed));
    assert!(!TaskStatus::Cancelled.accepts(TaskStatus::Running));
    assert!(!TaskStatus::Timeout.accepts(TaskStatus::Completed));
}

#[test]
fn status_parse_round_trips_wire_names() {
    for s in ["sent", "queued", "running", "completed", "failed", "cancelled", "timeout"] {
        let status = TaskStatus::parse(s).expect(s);
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, format!("\"{}\"", s));
    }
    assert_eq!(TaskStatus::parse("exploded"), None);
}

#[test]
fn stored_task_json_round_trip() {
    let mut task = StoredTask::new("t-1", "node-b", "ls -la", TaskSource::Remote, 1_000);
    task.acked_at = Some(1_100);
    task.status = TaskStatus::Queued;

    let json = serde_json::to_string(&task).unwrap();
    let back: StoredTask = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);

    // Persisted field names are camelCase
    assert!(json.contains("\"taskId\""));
    assert!(json.contains("\"targetNodeId\""));
    assert!(json.contains("\"sentAt\""));
    // Absent optionals are omitted entirely
    assert!(!json.contains("startedAt"));
}

#[test]
fn received_status_guard_matches_sent_guard() {
    assert!(ReceivedStatus::Queued.accepts(ReceivedStatus::Running));
    assert!(!ReceivedStatus::Running.accepts(ReceivedStatus::Queued));
    assert!(!ReceivedStatus::Failed.accepts(ReceivedStatus::Completed));
    assert!(ReceivedStatus::Cancelled.accepts(ReceivedStatus::Cancelled));
}

#[test]
fn received_task_defaults_priority_to_normal() {
    let json = r#"{"taskId":"t","fromNodeId":"n","instruction":"x",
                   "status":"queued","receivedAt":5}"#;
    let task: ReceivedTask = serde_json::from_str(json).unwrap();
    assert_eq!(task.priority, TaskPriority::Normal);
    assert_eq!(task.session_key, None);
}
