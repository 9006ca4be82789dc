// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sent-task store (`tasks.json`).
//!
//! Most-recent-first, capped at 200. Status updates obey the monotonic
//! order `sent < queued < running < terminal`; regressing frames from the
//! hub are discarded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ch_core::{StoredTask, TaskStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{atomic_write, load_json, schedule_save, updated_at_now, Persist, SaveState};

/// Maximum retained sent tasks; the oldest is evicted past this.
pub const SENT_TASK_CAP: usize = 200;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskFile {
    version: u32,
    updated_at: String,
    tasks: Vec<StoredTask>,
}

/// Filter for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub node_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

/// Counts by status for the status verb.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: usize,
    pub sent: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timeout: usize,
}

#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    tasks: Mutex<Vec<StoredTask>>,
    save: SaveState,
}

impl Persist for Inner {
    fn save_state(&self) -> &SaveState {
        &self.save
    }

    fn write_now(&self) {
        let file = TaskFile {
            version: 1,
            updated_at: updated_at_now(),
            tasks: self.tasks.lock().clone(),
        };
        if let Ok(bytes) = serde_json::to_vec_pretty(&file) {
            let _ = atomic_write(&self.path, &bytes);
        }
    }
}

impl TaskStore {
    pub fn open(path: PathBuf, debounce: Duration) -> Self {
        let tasks = load_json::<TaskFile>(&path).map(|f| f.tasks).unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                path,
                tasks: Mutex::new(tasks),
                save: SaveState::new(debounce),
            }),
        }
    }

    /// Record a freshly sent task at the front of the log.
    pub fn record_sent(&self, task: StoredTask) {
        {
            let mut tasks = self.inner.tasks.lock();
            tasks.insert(0, task);
            tasks.truncate(SENT_TASK_CAP);
        }
        schedule_save(&self.inner);
    }

    /// Apply a status transition reported by the target node. `at_ms` stamps
    /// `acked_at` (first non-sent status) and `started_at` (running).
    ///
    /// Returns the updated task, or `None` when the task is unknown or the
    /// transition would regress.
    pub fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        at_ms: u64,
    ) -> Option<StoredTask> {
        let updated = {
            let mut tasks = self.inner.tasks.lock();
            let task = tasks.iter_mut().find(|t| t.task_id == task_id)?;
            if !task.status.accepts(status) {
                return None;
            }
            task.status = status;
            if status != TaskStatus::Sent && task.acked_at.is_none() {
                task.acked_at = Some(at_ms);
            }
            if status == TaskStatus::Running && task.started_at.is_none() {
                task.started_at = Some(at_ms);
            }
            if status.is_terminal() && task.completed_at.is_none() {
                task.completed_at = Some(at_ms);
                task.duration_ms = Some(at_ms.saturating_sub(task.sent_at));
            }
            task.clone()
        };
        schedule_save(&self.inner);
        Some(updated)
    }

    /// Apply a terminal result frame: sets `completed_at` and derives
    /// `duration_ms` from `sent_at`.
    pub fn record_result(
        &self,
        task_id: &str,
        success: bool,
        result: Option<String>,
        error: Option<String>,
        at_ms: u64,
    ) -> Option<StoredTask> {
        let status = if success { TaskStatus::Completed } else { TaskStatus::Failed };
        let updated = {
            let mut tasks = self.inner.tasks.lock();
            let task = tasks.iter_mut().find(|t| t.task_id == task_id)?;
            if !task.status.accepts(status) {
                return None;
            }
            task.status = status;
            task.result = result;
            task.error = error;
            task.completed_at = Some(at_ms);
            task.duration_ms = Some(at_ms.saturating_sub(task.sent_at));
            task.clone()
        };
        schedule_save(&self.inner);
        Some(updated)
    }

    /// Transition a non-terminal task to `cancelled` (local cancel path).
    pub fn cancel(&self, task_id: &str, at_ms: u64) -> Option<StoredTask> {
        self.update_status(task_id, TaskStatus::Cancelled, at_ms)
    }

    pub fn get(&self, task_id: &str) -> Option<StoredTask> {
        self.inner.tasks.lock().iter().find(|t| t.task_id == task_id).cloned()
    }

    pub fn list(&self, filter: &TaskFilter) -> Vec<StoredTask> {
        let tasks = self.inner.tasks.lock();
        let iter = tasks.iter().filter(|t| {
            filter.node_id.as_deref().is_none_or(|n| t.target_node_id == n)
                && filter.status.is_none_or(|s| t.status == s)
        });
        match filter.limit {
            Some(limit) => iter.take(limit).cloned().collect(),
            None => iter.cloned().collect(),
        }
    }

    pub fn summary(&self) -> TaskSummary {
        let tasks = self.inner.tasks.lock();
        let mut summary = TaskSummary { total: tasks.len(), ..Default::default() };
        for task in tasks.iter() {
            match task.status {
                TaskStatus::Sent => summary.sent += 1,
                TaskStatus::Queued => summary.queued += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
                TaskStatus::Timeout => summary.timeout += 1,
            }
        }
        summary
    }

    /// Remove terminal tasks, optionally only those completed before
    /// `before` (epoch ms). Returns the number cleared.
    pub fn clear_completed(&self, before: Option<u64>) -> usize {
        let cleared = {
            let mut tasks = self.inner.tasks.lock();
            let len_before = tasks.len();
            tasks.retain(|t| {
                if !t.status.is_terminal() {
                    return true;
                }
                match before {
                    Some(cutoff) => t.completed_at.unwrap_or(0) >= cutoff,
                    None => false,
                }
            });
            len_before - tasks.len()
        };
        if cleared > 0 {
            schedule_save(&self.inner);
        }
        cleared
    }

    pub fn flush(&self) {
        self.inner.write_now();
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
