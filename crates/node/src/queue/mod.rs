// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-pool task queue.
//!
//! Dispatching (pool A) is bounded by `max_concurrent`: a slot is held only
//! for the agent submit round-trip. Inflight (pool B) is unbounded: tasks
//! that were dispatched and now await agent completion. Tasks wait in a
//! FIFO queue while pool A is full. Completed tasks land in a ring of 50.
//!
//! Invariants: |A| ≤ max_concurrent at all times; a task is in at most one
//! of {waiting, A, B, completed}; exactly one `task_ack{running}` precedes
//! exactly one `result` per started task; a task cancelled while waiting
//! emits no running ack.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ch_core::{short, Clock, ReceivedStatus, ReceivedTask, TaskPriority};
use ch_storage::ReceivedTaskStore;
use ch_wire::{Frame, ResultPayload, TaskAckPayload, TaskQueueHints};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::{dispatch_task, wait_and_collect, AgentBridge, TaskOutcome};

/// Dispatch slots by default; clamped to [1, 10].
pub const DEFAULT_MAX_CONCURRENT: u32 = 3;
/// Completed ring capacity.
pub const COMPLETED_RING_CAP: usize = 50;
/// Instruction prefix length in status snapshots.
pub const INSTRUCTION_PREVIEW_LEN: usize = 100;

pub fn clamp_max_concurrent(value: u32) -> usize {
    value.clamp(1, 10) as usize
}

/// A waiting task in the status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedBrief {
    pub task_id: String,
    pub instruction: String,
    pub received_at: u64,
}

/// A running (dispatching or inflight) task in the status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningBrief {
    pub task_id: String,
    pub instruction: String,
    pub started_at: u64,
}

/// A finished task in the completed ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedBrief {
    pub task_id: String,
    pub instruction: String,
    pub status: ReceivedStatus,
    pub completed_at: u64,
}

/// Queue snapshot for the status verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub max_concurrent: usize,
    pub queued: usize,
    pub dispatching: usize,
    pub inflight: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued_tasks: Vec<QueuedBrief>,
    pub running_tasks: Vec<RunningBrief>,
    pub recent_completed: Vec<CompletedBrief>,
}

struct TaskEntry {
    from: String,
    instruction: String,
    received_at: u64,
    started_at: Option<u64>,
}

#[derive(Default)]
struct QueueState {
    max_concurrent: usize,
    waiting: VecDeque<String>,
    dispatching: HashSet<String>,
    /// task id → agent session key
    inflight: HashMap<String, String>,
    entries: HashMap<String, TaskEntry>,
    completed: VecDeque<CompletedBrief>,
    cancel_requested: HashSet<String>,
}

pub struct TaskQueue<B, C: Clock> {
    inner: Arc<Inner<B, C>>,
}

impl<B, C: Clock> Clone for TaskQueue<B, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<B, C: Clock> {
    bridge: Arc<B>,
    clock: C,
    received: ReceivedTaskStore,
    /// Outbound frames (acks, results); the coordinator forwards these to
    /// the hub client.
    sink: mpsc::Sender<Frame>,
    task_timeout_ms: u64,
    state: Mutex<QueueState>,
}

impl<B, C> TaskQueue<B, C>
where
    B: AgentBridge,
    C: Clock,
{
    pub fn new(
        bridge: Arc<B>,
        clock: C,
        received: ReceivedTaskStore,
        sink: mpsc::Sender<Frame>,
        max_concurrent: u32,
        task_timeout_ms: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                clock,
                received,
                sink,
                task_timeout_ms,
                state: Mutex::new(QueueState {
                    max_concurrent: clamp_max_concurrent(max_concurrent),
                    ..Default::default()
                }),
            }),
        }
    }

    /// Accept an inbound task. Starts it immediately when a dispatch slot is
    /// free, otherwise queues it and acks `queued` with its position.
    pub async fn enqueue(
        &self,
        task_id: &str,
        from: &str,
        instruction: &str,
        priority: TaskPriority,
        hints: Option<&TaskQueueHints>,
    ) {
        let now = self.inner.clock.epoch_ms();
        self.inner.received.record(ReceivedTask::new(task_id, from, instruction, priority, now));

        if let Some(max) = hints.and_then(|h| h.max_concurrent) {
            self.inner.state.lock().max_concurrent = clamp_max_concurrent(max);
        }

        let queued_position = {
            let mut state = self.inner.state.lock();
            state.entries.insert(
                task_id.to_string(),
                TaskEntry {
                    from: from.to_string(),
                    instruction: instruction.to_string(),
                    received_at: now,
                    started_at: None,
                },
            );
            if state.dispatching.len() >= state.max_concurrent {
                state.waiting.push_back(task_id.to_string());
                Some(state.waiting.len())
            } else {
                None
            }
        };

        match queued_position {
            Some(position) => {
                tracing::debug!(task = task_id, position, "task queued, slots busy");
                self.send_frame(Frame::task_ack(task_id, from, &TaskAckPayload::queued(position)))
                    .await;
            }
            None => self.start(task_id).await,
        }
    }

    /// Cancel a task. Waiting tasks are removed outright (one synthesized
    /// cancelled result, no running ack). Inflight tasks get their agent
    /// session deleted; the pending wait surfaces the error and the normal
    /// finalization path remaps it to `cancelled`. Returns false when there
    /// is nothing to cancel (including tasks mid-submit that have no
    /// session handle yet).
    pub async fn cancel(&self, task_id: &str) -> bool {
        let now = self.inner.clock.epoch_ms();

        enum CancelPath {
            Waiting { from: String, instruction: String },
            Inflight { session_key: String },
            None,
        }

        let path = {
            let mut state = self.inner.state.lock();
            if let Some(index) = state.waiting.iter().position(|id| id == task_id) {
                state.waiting.remove(index);
                let entry = state.entries.remove(task_id);
                let (from, instruction) = entry
                    .map(|e| (e.from, e.instruction))
                    .unwrap_or_else(|| (String::new(), String::new()));
                state.completed.push_front(CompletedBrief {
                    task_id: task_id.to_string(),
                    instruction: preview(&instruction),
                    status: ReceivedStatus::Cancelled,
                    completed_at: now,
                });
                state.completed.truncate(COMPLETED_RING_CAP);
                CancelPath::Waiting { from, instruction }
            } else if let Some(session_key) = state.inflight.get(task_id).cloned() {
                state.cancel_requested.insert(task_id.to_string());
                CancelPath::Inflight { session_key }
            } else {
                CancelPath::None
            }
        };

        match path {
            CancelPath::Waiting { from, instruction: _ } => {
                self.inner.received.finish(
                    task_id,
                    ReceivedStatus::Cancelled,
                    None,
                    Some("cancelled".into()),
                    now,
                );
                self.send_frame(Frame::result(task_id, &from, &ResultPayload::err("cancelled")))
                    .await;
                true
            }
            CancelPath::Inflight { session_key } => {
                let bridge = Arc::clone(&self.inner.bridge);
                tokio::spawn(async move {
                    let _ = bridge.delete_session(&session_key).await;
                });
                true
            }
            CancelPath::None => false,
        }
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        let queued_tasks = state
            .waiting
            .iter()
            .filter_map(|id| {
                state.entries.get(id).map(|entry| QueuedBrief {
                    task_id: id.clone(),
                    instruction: preview(&entry.instruction),
                    received_at: entry.received_at,
                })
            })
            .collect();
        let running_tasks = state
            .dispatching
            .iter()
            .chain(state.inflight.keys())
            .filter_map(|id| {
                state.entries.get(id).map(|entry| RunningBrief {
                    task_id: id.clone(),
                    instruction: preview(&entry.instruction),
                    started_at: entry.started_at.unwrap_or(entry.received_at),
                })
            })
            .collect();
        QueueStatus {
            max_concurrent: state.max_concurrent,
            queued: state.waiting.len(),
            dispatching: state.dispatching.len(),
            inflight: state.inflight.len(),
            running: state.dispatching.len() + state.inflight.len(),
            completed: state
                .completed
                .iter()
                .filter(|c| c.status == ReceivedStatus::Completed)
                .count(),
            failed: state
                .completed
                .iter()
                .filter(|c| c.status == ReceivedStatus::Failed)
                .count(),
            queued_tasks,
            running_tasks,
            recent_completed: state.completed.iter().take(10).cloned().collect(),
        }
    }

    /// Running count for heartbeat load reporting.
    pub fn active_count(&self) -> u32 {
        let state = self.inner.state.lock();
        (state.dispatching.len() + state.inflight.len()) as u32
    }

    pub async fn set_max_concurrent(&self, value: u32) {
        self.inner.state.lock().max_concurrent = clamp_max_concurrent(value);
        self.dequeue().await;
    }

    // Take a dispatch slot, ack `running`, and spawn the run.
    //
    // Boxed (rather than a plain `async fn`) to break the mutual-recursion
    // cycle start -> spawn(run) -> dequeue -> start: without an explicit
    // `dyn Future + Send` boundary the compiler cannot prove the spawned
    // future is `Send` (the opaque return types expand into each other
    // indefinitely).
    fn start<'a>(&'a self, task_id: &'a str) -> futures_util::future::BoxFuture<'a, ()> {
        Box::pin(async move {
            let now = self.inner.clock.epoch_ms();
            let from = {
                let mut state = self.inner.state.lock();
                let Some(entry) = state.entries.get_mut(task_id) else { return };
                entry.started_at = Some(now);
                let from = entry.from.clone();
                state.dispatching.insert(task_id.to_string());
                from
            };

            self.inner.received.mark_running(task_id, None, now);
            self.send_frame(Frame::task_ack(task_id, &from, &TaskAckPayload::running())).await;

            let queue = self.clone();
            let task_id = task_id.to_string();
            tokio::spawn(async move { queue.run(&task_id).await });
        })
    }

    fn run<'a>(&'a self, task_id: &'a str) -> futures_util::future::BoxFuture<'a, ()> {
        Box::pin(async move {
            let instruction = {
                let state = self.inner.state.lock();
                match state.entries.get(task_id) {
                    Some(entry) => entry.instruction.clone(),
                    None => return,
                }
            };

            let outcome = match dispatch_task(self.inner.bridge.as_ref(), task_id, &instruction).await {
                Ok(dispatch) => {
                    // Submit round-trip done: free the slot before the wait.
                    {
                        let mut state = self.inner.state.lock();
                        state.dispatching.remove(task_id);
                        state.inflight.insert(task_id.to_string(), dispatch.session_key.clone());
                    }
                    self.inner.received.bind_session(task_id, dispatch.session_key.clone());
                    self.dequeue().await;

                    wait_and_collect(
                        self.inner.bridge.as_ref(),
                        &dispatch.run_id,
                        &dispatch.session_key,
                        self.inner.task_timeout_ms,
                    )
                    .await
                }
                Err(e) => {
                    tracing::warn!(task = task_id, error = %e, "agent dispatch failed");
                    self.inner.state.lock().dispatching.remove(task_id);
                    TaskOutcome::err(e.to_string())
                }
            };

            self.finalize(task_id, outcome).await;
        })
    }

    fn finalize<'a>(&'a self, task_id: &'a str, outcome: TaskOutcome) -> futures_util::future::BoxFuture<'a, ()> {
        Box::pin(async move {
        let now = self.inner.clock.epoch_ms();
        let (from, status, payload) = {
            let mut state = self.inner.state.lock();
            state.inflight.remove(task_id);
            let was_cancelled = state.cancel_requested.remove(task_id);

            let status = if outcome.success {
                ReceivedStatus::Completed
            } else if was_cancelled {
                ReceivedStatus::Cancelled
            } else {
                ReceivedStatus::Failed
            };
            let payload = if outcome.success {
                ResultPayload {
                    success: true,
                    result: outcome.result.clone(),
                    error: None,
                }
            } else if was_cancelled {
                ResultPayload::err("cancelled")
            } else {
                ResultPayload {
                    success: false,
                    result: None,
                    error: outcome.error.clone(),
                }
            };

            let entry = state.entries.remove(task_id);
            let (from, instruction) = entry
                .map(|e| (e.from, e.instruction))
                .unwrap_or_else(|| (String::new(), String::new()));
            state.completed.push_front(CompletedBrief {
                task_id: task_id.to_string(),
                instruction: preview(&instruction),
                status,
                completed_at: now,
            });
            state.completed.truncate(COMPLETED_RING_CAP);
            (from, status, payload)
        };

        self.inner.received.finish(
            task_id,
            status,
            payload.result.clone(),
            payload.error.clone(),
            now,
        );
        self.send_frame(Frame::result(task_id, &from, &payload)).await;
        // Defensive: the slot freed at dispatch time normally drained the
        // queue already.
        self.dequeue().await;
        })
    }

    fn dequeue(&self) -> futures_util::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let next = {
                    let mut state = self.inner.state.lock();
                    if state.dispatching.len() >= state.max_concurrent {
                        return;
                    }
                    match state.waiting.pop_front() {
                        Some(id) => id,
                        None => return,
                    }
                };
                self.start(&next).await;
            }
        })
    }

    async fn send_frame(&self, frame: Frame) {
        if self.inner.sink.send(frame).await.is_err() {
            tracing::warn!("queue frame sink closed");
        }
    }
}

fn preview(instruction: &str) -> String {
    short(instruction, INSTRUCTION_PREVIEW_LEN).to_string()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
