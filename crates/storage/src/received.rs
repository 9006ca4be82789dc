// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Received-task store (`received-tasks.json`).
//!
//! Inbound tasks are never deleted individually; the log trims to 200
//! most-recent-first. The stored `session_key` is the handle used to cancel
//! a running agent run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ch_core::{ReceivedStatus, ReceivedTask};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{atomic_write, load_json, schedule_save, updated_at_now, Persist, SaveState};

/// Maximum retained received tasks.
pub const RECEIVED_TASK_CAP: usize = 200;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedFile {
    version: u32,
    updated_at: String,
    tasks: Vec<ReceivedTask>,
}

#[derive(Clone)]
pub struct ReceivedTaskStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    tasks: Mutex<Vec<ReceivedTask>>,
    save: SaveState,
}

impl Persist for Inner {
    fn save_state(&self) -> &SaveState {
        &self.save
    }

    fn write_now(&self) {
        let file = ReceivedFile {
            version: 1,
            updated_at: updated_at_now(),
            tasks: self.tasks.lock().clone(),
        };
        if let Ok(bytes) = serde_json::to_vec_pretty(&file) {
            let _ = atomic_write(&self.path, &bytes);
        }
    }
}

impl ReceivedTaskStore {
    pub fn open(path: PathBuf, debounce: Duration) -> Self {
        let tasks = load_json::<ReceivedFile>(&path).map(|f| f.tasks).unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                path,
                tasks: Mutex::new(tasks),
                save: SaveState::new(debounce),
            }),
        }
    }

    pub fn record(&self, task: ReceivedTask) {
        {
            let mut tasks = self.inner.tasks.lock();
            tasks.insert(0, task);
            tasks.truncate(RECEIVED_TASK_CAP);
        }
        schedule_save(&self.inner);
    }

    /// Mark a queued task running and bind its agent session handle.
    pub fn mark_running(&self, task_id: &str, session_key: Option<String>, at_ms: u64) {
        self.update(task_id, |task| {
            if task.status.accepts(ReceivedStatus::Running) {
                task.status = ReceivedStatus::Running;
                task.started_at = Some(at_ms);
                if session_key.is_some() {
                    task.session_key = session_key;
                }
            }
        });
    }

    /// Bind the session key once dispatch has returned it.
    pub fn bind_session(&self, task_id: &str, session_key: String) {
        self.update(task_id, |task| task.session_key = Some(session_key));
    }

    /// Apply a terminal outcome.
    pub fn finish(
        &self,
        task_id: &str,
        status: ReceivedStatus,
        result: Option<String>,
        error: Option<String>,
        at_ms: u64,
    ) {
        self.update(task_id, |task| {
            if task.status.accepts(status) {
                task.status = status;
                task.result = result;
                task.error = error;
                task.completed_at = Some(at_ms);
            }
        });
    }

    pub fn get(&self, task_id: &str) -> Option<ReceivedTask> {
        self.inner.tasks.lock().iter().find(|t| t.task_id == task_id).cloned()
    }

    pub fn list(&self, limit: Option<usize>) -> Vec<ReceivedTask> {
        let tasks = self.inner.tasks.lock();
        match limit {
            Some(limit) => tasks.iter().take(limit).cloned().collect(),
            None => tasks.clone(),
        }
    }

    pub fn flush(&self) {
        self.inner.write_now();
    }

    fn update(&self, task_id: &str, f: impl FnOnce(&mut ReceivedTask)) {
        let found = {
            let mut tasks = self.inner.tasks.lock();
            match tasks.iter_mut().find(|t| t.task_id == task_id) {
                Some(task) => {
                    f(task);
                    true
                }
                None => false,
            }
        };
        if found {
            schedule_save(&self.inner);
        }
    }
}

#[cfg(test)]
#[path = "received_tests.rs"]
mod tests;
