// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local agent bridge.
//!
//! The local AI runtime is reached over a one-shot WebSocket RPC: each call
//! opens the socket, performs the protocol handshake, issues a single
//! request, and closes. Executing a task is a three-step composition
//! (submit, then wait, then harvest) plus a best-effort session delete once the run
//! is terminal.

mod rpc;

pub use rpc::GatewayBridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default submit round-trip timeout.
pub const SUBMIT_TIMEOUT_MS: u64 = 15_000;
/// Margin added to the run timeout for the wait round-trip socket.
pub const WAIT_SOCKET_MARGIN_MS: u64 = 5_000;
/// History harvest timeout.
pub const HISTORY_TIMEOUT_MS: u64 = 10_000;
/// Session delete timeout (fire-and-forget).
pub const SESSION_DELETE_TIMEOUT_MS: u64 = 5_000;
/// Transcript entries fetched per harvest.
pub const HISTORY_LIMIT: u32 = 30;

/// Substituted when a run produced no assistant text.
pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "(no output)";

/// Errors from agent bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("gateway connect failed: {0}")]
    Connect(String),
    #[error("gateway rejected call: {0}")]
    Rejected(String),
    #[error("gateway call timed out after {0}ms")]
    Timeout(u64),
    #[error("malformed gateway response: {0}")]
    Malformed(String),
    #[error("session deleted: {0}")]
    SessionDeleted(String),
}

/// One transcript entry from the agent's chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: String,
    /// Either a plain string or an array of typed blocks.
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Adapter over the local agent gateway.
#[async_trait]
pub trait AgentBridge: Send + Sync + 'static {
    /// Submit a message for execution; returns the run id. Fire-and-forget
    /// on the agent side (`deliver: false`).
    async fn submit(
        &self,
        message: &str,
        session_key: &str,
        idempotency_key: &str,
    ) -> Result<String, BridgeError>;

    /// Block until the run is terminal (or the timeout expires).
    async fn wait(&self, run_id: &str, timeout_ms: u64) -> Result<(), BridgeError>;

    /// Fetch the most recent transcript entries for a session.
    async fn history(&self, session_key: &str) -> Result<Vec<AgentMessage>, BridgeError>;

    /// Delete an agent session. Best-effort: errors are ignored by callers.
    async fn delete_session(&self, session_key: &str) -> Result<(), BridgeError>;
}

/// Handles returned by a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub run_id: String,
    pub session_key: String,
}

/// Terminal outcome of a task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn ok(result: String) -> Self {
        Self { success: true, result: Some(result), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(error.into()) }
    }
}

/// Submit a task to the agent. Returns as soon as the submit round-trip
/// completes, so the dispatch slot can be released while the run continues.
pub async fn dispatch_task<B: AgentBridge + ?Sized>(
    bridge: &B,
    task_id: &str,
    instruction: &str,
) -> Result<Dispatch, BridgeError> {
    let session_key = ch_core::task_session_key(task_id);
    let run_id = bridge.submit(instruction, &session_key, task_id).await?;
    tracing::debug!(task = task_id, run = %run_id, "task dispatched to agent");
    Ok(Dispatch { run_id, session_key })
}

/// Wait for a run to finish, harvest its assistant text, and delete the
/// session. The delete happens on every terminal path, success or not.
pub async fn wait_and_collect<B: AgentBridge + ?Sized>(
    bridge: &B,
    run_id: &str,
    session_key: &str,
    timeout_ms: u64,
) -> TaskOutcome {
    let outcome = match bridge.wait(run_id, timeout_ms).await {
        Ok(()) => match bridge.history(session_key).await {
            Ok(messages) => TaskOutcome::ok(collect_assistant_text(&messages)),
            Err(e) => TaskOutcome::err(format!("history harvest failed: {}", e)),
        },
        Err(e) => TaskOutcome::err(e.to_string()),
    };
    if let Err(e) = bridge.delete_session(session_key).await {
        tracing::debug!(session = session_key, error = %e, "session cleanup failed");
    }
    outcome
}

/// Synchronous wrapper: dispatch, then wait. Used for self-targeted tasks in
/// local mode.
pub async fn execute_locally<B: AgentBridge + ?Sized>(
    bridge: &B,
    task_id: &str,
    instruction: &str,
    timeout_ms: u64,
) -> TaskOutcome {
    match dispatch_task(bridge, task_id, instruction).await {
        Ok(dispatch) => {
            wait_and_collect(bridge, &dispatch.run_id, &dispatch.session_key, timeout_ms).await
        }
        Err(e) => TaskOutcome::err(e.to_string()),
    }
}

/// Concatenate the text blocks of every assistant message, in order. An
/// empty harvest yields [`EMPTY_OUTPUT_PLACEHOLDER`].
pub fn collect_assistant_text(messages: &[AgentMessage]) -> String {
    let mut acc = String::new();
    for message in messages.iter().filter(|m| m.role == "assistant") {
        let text = reduce_content(&message.content);
        if text.is_empty() {
            continue;
        }
        if !acc.is_empty() {
            acc.push('\n');
        }
        acc.push_str(&text);
    }
    let trimmed = acc.trim();
    if trimmed.is_empty() {
        EMPTY_OUTPUT_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reduce a message content value to its text: strings pass through, block
/// arrays keep `{type: "text"}` blocks only.
pub fn reduce_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => {
            let mut acc = String::new();
            for block in blocks {
                if block.get("type").and_then(|t| t.as_str()) != Some("text") {
                    continue;
                }
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    if !acc.is_empty() {
                        acc.push('\n');
                    }
                    acc.push_str(text);
                }
            }
            acc
        }
        _ => String::new(),
    }
}

// Test support - only compiled for tests
#[cfg(test)]
mod fake;
#[cfg(test)]
pub use fake::{FakeAgentBridge, SubmitCall};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
