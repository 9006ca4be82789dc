// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot WebSocket RPC to the local agent gateway.
//!
//! Connect → `connect` handshake (protocol pinned to 3) → one request →
//! matching response → close. Keeping no socket open isolates failures;
//! at this call rate a pool buys nothing.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use super::{
    AgentBridge, AgentMessage, BridgeError, HISTORY_LIMIT, HISTORY_TIMEOUT_MS,
    SESSION_DELETE_TIMEOUT_MS, SUBMIT_TIMEOUT_MS, WAIT_SOCKET_MARGIN_MS,
};

/// Gateway protocol version, pinned on both handshake bounds.
const PROTOCOL_VERSION: u32 = 3;

/// Bridge to the agent gateway on `ws://127.0.0.1:<port>`.
#[derive(Clone)]
pub struct GatewayBridge {
    port: u16,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    payload: Value,
}

impl GatewayBridge {
    pub fn new(port: u16, token: Option<String>) -> Self {
        Self { port, token }
    }

    /// One full RPC round-trip with `timeout` covering connect, handshake,
    /// request, and response.
    async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        tokio::time::timeout(timeout, self.call_inner(method, params))
            .await
            .map_err(|_| BridgeError::Timeout(timeout.as_millis() as u64))?
    }

    async fn call_inner(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let url = format!("ws://127.0.0.1:{}", self.port);
        let (mut ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;

        let handshake_id = ch_core::new_uuid();
        let handshake = json!({
            "type": "req",
            "id": handshake_id,
            "method": "connect",
            "params": {
                "minProtocol": PROTOCOL_VERSION,
                "maxProtocol": PROTOCOL_VERSION,
                "client": "clawhub-node",
                "auth": { "token": self.token },
            },
        });
        ws.send(Message::Text(handshake.to_string()))
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;
        Self::await_response(&mut ws, &handshake_id).await?;

        let request_id = ch_core::new_uuid();
        let request = json!({
            "type": "req",
            "id": request_id,
            "method": method,
            "params": params,
        });
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;
        let payload = Self::await_response(&mut ws, &request_id).await?;

        let _ = ws.close(None).await;
        Ok(payload)
    }

    /// Read frames until the response matching `id` arrives. Event frames
    /// and unrelated responses are skipped.
    async fn await_response<S>(ws: &mut S, id: &str) -> Result<Value, BridgeError>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| BridgeError::Connect(e.to_string()))?;
            let Message::Text(text) = frame else { continue };
            let Ok(response) = serde_json::from_str::<RpcResponse>(&text) else { continue };
            if response.kind != "res" || response.id.as_deref() != Some(id) {
                continue;
            }
            if response.ok == Some(false) {
                let message = response
                    .payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("call failed")
                    .to_string();
                return Err(BridgeError::Rejected(message));
            }
            return Ok(response.payload);
        }
        Err(BridgeError::Connect("gateway closed the socket mid-call".into()))
    }
}

#[async_trait::async_trait]
impl AgentBridge for GatewayBridge {
    async fn submit(
        &self,
        message: &str,
        session_key: &str,
        idempotency_key: &str,
    ) -> Result<String, BridgeError> {
        let payload = self
            .call(
                "agent",
                json!({
                    "message": message,
                    "sessionKey": session_key,
                    "idempotencyKey": idempotency_key,
                    "deliver": false,
                }),
                Duration::from_millis(SUBMIT_TIMEOUT_MS),
            )
            .await?;
        payload
            .get("runId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| BridgeError::Malformed("submit response missing runId".into()))
    }

    async fn wait(&self, run_id: &str, timeout_ms: u64) -> Result<(), BridgeError> {
        self.call(
            "agent.wait",
            json!({ "runId": run_id, "timeoutMs": timeout_ms }),
            Duration::from_millis(timeout_ms + WAIT_SOCKET_MARGIN_MS),
        )
        .await?;
        Ok(())
    }

    async fn history(&self, session_key: &str) -> Result<Vec<AgentMessage>, BridgeError> {
        let payload = self
            .call(
                "chat.history",
                json!({ "sessionKey": session_key, "limit": HISTORY_LIMIT }),
                Duration::from_millis(HISTORY_TIMEOUT_MS),
            )
            .await?;
        let messages = payload
            .get("messages")
            .cloned()
            .ok_or_else(|| BridgeError::Malformed("history response missing messages".into()))?;
        serde_json::from_value(messages)
            .map_err(|e| BridgeError::Malformed(format!("history entries: {}", e)))
    }

    async fn delete_session(&self, session_key: &str) -> Result<(), BridgeError> {
        self.call(
            "sessions.delete",
            json!({ "key": session_key }),
            Duration::from_millis(SESSION_DELETE_TIMEOUT_MS),
        )
        .await
        .map(|_| ())
    }
}
