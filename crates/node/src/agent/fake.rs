// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake agent bridge for tests: recorded calls, scripted outcomes, and
//! externally released waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{AgentBridge, AgentMessage, BridgeError};

/// Recorded submit call.
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub run_id: String,
    pub message: String,
    pub session_key: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
enum FakeOutcome {
    Done,
    Failed(String),
    SessionKilled(String),
}

#[derive(Default)]
struct FakeState {
    submits: Vec<SubmitCall>,
    deleted: Vec<String>,
    next_run: u64,
    session_runs: HashMap<String, String>,
    outcomes: HashMap<String, FakeOutcome>,
    histories: HashMap<String, Vec<AgentMessage>>,
    submit_error: Option<String>,
    auto_complete: bool,
}

#[derive(Clone, Default)]
pub struct FakeAgentBridge {
    inner: Arc<Mutex<FakeState>>,
    notify: Arc<Notify>,
}

impl FakeAgentBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `wait` return success immediately.
    pub fn auto_complete(self) -> Self {
        self.inner.lock().auto_complete = true;
        self
    }

    /// Make the next submits fail with `message`.
    pub fn fail_submits(&self, message: impl Into<String>) {
        self.inner.lock().submit_error = Some(message.into());
    }

    /// Release a pending wait with success.
    pub fn complete_run(&self, run_id: &str) {
        self.inner.lock().outcomes.insert(run_id.into(), FakeOutcome::Done);
        self.notify.notify_waiters();
    }

    /// Release a pending wait with a failure.
    pub fn fail_run(&self, run_id: &str, error: impl Into<String>) {
        self.inner.lock().outcomes.insert(run_id.into(), FakeOutcome::Failed(error.into()));
        self.notify.notify_waiters();
    }

    /// Script the transcript returned for a session.
    pub fn set_history(&self, session_key: &str, messages: Vec<AgentMessage>) {
        self.inner.lock().histories.insert(session_key.into(), messages);
        self.notify.notify_waiters();
    }

    pub fn submits(&self) -> Vec<SubmitCall> {
        self.inner.lock().submits.clone()
    }

    pub fn deleted_sessions(&self) -> Vec<String> {
        self.inner.lock().deleted.clone()
    }

    /// Run id of the `n`th submit (0-based). Panics when absent.
    pub fn run_id(&self, n: usize) -> String {
        self.inner.lock().submits[n].run_id.clone()
    }
}

#[async_trait]
impl AgentBridge for FakeAgentBridge {
    async fn submit(
        &self,
        message: &str,
        session_key: &str,
        idempotency_key: &str,
    ) -> Result<String, BridgeError> {
        let mut state = self.inner.lock();
        if let Some(error) = state.submit_error.clone() {
            return Err(BridgeError::Rejected(error));
        }
        state.next_run += 1;
        let run_id = format!("run-{}", state.next_run);
        state.submits.push(SubmitCall {
            run_id: run_id.clone(),
            message: message.into(),
            session_key: session_key.into(),
            idempotency_key: idempotency_key.into(),
        });
        state.session_runs.insert(session_key.into(), run_id.clone());
        if state.auto_complete {
            state.outcomes.insert(run_id.clone(), FakeOutcome::Done);
        }
        Ok(run_id)
    }

    async fn wait(&self, run_id: &str, timeout_ms: u64) -> Result<(), BridgeError> {
        let waited = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            loop {
                let notified = self.notify.notified();
                if let Some(outcome) = self.inner.lock().outcomes.get(run_id).cloned() {
                    return outcome;
                }
                notified.await;
            }
        })
        .await;
        match waited {
            Ok(FakeOutcome::Done) => Ok(()),
            Ok(FakeOutcome::Failed(error)) => Err(BridgeError::Rejected(error)),
            Ok(FakeOutcome::SessionKilled(error)) => Err(BridgeError::SessionDeleted(error)),
            Err(_) => Err(BridgeError::Timeout(timeout_ms)),
        }
    }

    async fn history(&self, session_key: &str) -> Result<Vec<AgentMessage>, BridgeError> {
        Ok(self.inner.lock().histories.get(session_key).cloned().unwrap_or_default())
    }

    async fn delete_session(&self, session_key: &str) -> Result<(), BridgeError> {
        let mut state = self.inner.lock();
        state.deleted.push(session_key.to_string());
        // Killing the session terminates any pending wait, like the real
        // gateway does.
        if let Some(run_id) = state.session_runs.get(session_key).cloned() {
            state
                .outcomes
                .entry(run_id)
                .or_insert_with(|| FakeOutcome::SessionKilled(format!(
                    "session deleted: {}",
                    session_key
                )));
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
