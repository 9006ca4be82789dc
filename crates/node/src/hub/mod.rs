// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub transport: authenticated REST verbs plus the WebSocket uplink.
//!
//! The client owns an event channel; the coordinator consumes the receiver
//! returned by [`HubClient::new`]. There is no back-pointer from the client
//! into the coordinator.

mod events;
mod route;
mod ws;

pub use events::HubEvent;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ch_core::{NodeConfig, NodeIdentity, PeerNode};
use ch_wire::Frame;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Node directory cache TTL.
pub const NODE_CACHE_TTL: Duration = Duration::from_secs(15);

/// Outbound frame buffer between callers and the uplink task.
const OUTBOX_DEPTH: usize = 256;
/// Event buffer between the uplink task and the coordinator.
const EVENT_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub replied {status}: {message}")]
    Api { status: u16, message: String },
    #[error("not registered with a hub")]
    NotRegistered,
    #[error("bad hub url: {0}")]
    BadUrl(String),
}

/// Registration request body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

/// Registration reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub node_id: String,
    pub cluster_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub depth: u32,
    pub token: String,
}

/// Reparent reply; the hub may rotate the token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReparentResponse {
    pub parent_id: Option<String>,
    pub depth: Option<u32>,
    pub token: Option<String>,
}

/// Connection/identity snapshot for the status verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    pub registered: bool,
    pub connected: bool,
    pub node_id: Option<String>,
    pub cluster_id: Option<String>,
    pub parent_id: Option<String>,
    pub pending_tasks: usize,
    pub cached_nodes: usize,
    pub change_seq: u64,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

struct NodeCache {
    fetched_at: Instant,
    nodes: Vec<PeerNode>,
}

/// State shared between the client facade, the uplink task, and the router.
pub(crate) struct HubShared {
    base_url: String,
    admin_key: Option<String>,
    identity: Mutex<NodeIdentity>,
    connected: AtomicBool,
    change_seq: AtomicU64,
    node_cache: Mutex<Option<NodeCache>>,
    heartbeat_interval: Duration,
    reconnect_interval: Duration,
}

impl HubShared {
    pub(crate) fn bump_change_seq(&self) -> u64 {
        self.change_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn invalidate_node_cache(&self) {
        *self.node_cache.lock() = None;
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn token(&self) -> Option<String> {
        self.identity.lock().token.clone()
    }
}

/// Load sample reported in heartbeat frames.
pub type LoadSnapshot = Arc<dyn Fn() -> ch_wire::HeartbeatPayload + Send + Sync>;

pub struct HubClient {
    shared: Arc<HubShared>,
    http: reqwest::Client,
    outbox_tx: mpsc::Sender<Frame>,
    outbox_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    events_tx: mpsc::Sender<HubEvent>,
    /// true → the uplink should hold a connection.
    desired: watch::Sender<bool>,
    uplink_started: AtomicBool,
}

impl HubClient {
    /// Build a client from config. Returns the event receiver the
    /// coordinator consumes.
    pub fn new(config: &NodeConfig) -> (Self, mpsc::Receiver<HubEvent>) {
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_DEPTH);
        let (events_tx, events_rx) = mpsc::channel(EVENT_DEPTH);
        let (desired, _) = watch::channel(false);
        let client = Self {
            shared: Arc::new(HubShared {
                base_url: config.hub_url.trim_end_matches('/').to_string(),
                admin_key: config.admin_key.clone(),
                identity: Mutex::new(config.identity()),
                connected: AtomicBool::new(false),
                change_seq: AtomicU64::new(0),
                node_cache: Mutex::new(None),
                heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
                reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            }),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            outbox_tx,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            events_tx,
            desired,
            uplink_started: AtomicBool::new(false),
        };
        (client, events_rx)
    }

    // -- WebSocket uplink --

    /// Open (or re-open) the uplink. The first call spawns the connection
    /// task; later calls just flip the desired state.
    pub fn connect(&self, load: LoadSnapshot) {
        if !self.uplink_started.swap(true, Ordering::SeqCst) {
            let outbox_rx = self
                .outbox_rx
                .lock()
                .take()
                .expect("uplink receiver consumed before first connect");
            tokio::spawn(ws::run_uplink(
                Arc::clone(&self.shared),
                outbox_rx,
                self.events_tx.clone(),
                self.desired.subscribe(),
                load,
            ));
        }
        let _ = self.desired.send(true);
    }

    /// Intentional close: the uplink drops the socket and does not re-arm
    /// the reconnect timer.
    pub fn disconnect(&self) {
        let _ = self.desired.send(false);
    }

    /// Queue a frame for the uplink. Non-blocking; dropped with a warning
    /// when the socket is down or the outbox is full.
    pub fn send(&self, frame: Frame) {
        if !self.shared.connected.load(Ordering::SeqCst) {
            tracing::warn!(kind = ?frame.kind, id = %frame.id, "hub socket down, frame dropped");
            return;
        }
        if let Err(e) = self.outbox_tx.try_send(frame) {
            tracing::warn!(error = %e, "hub outbox full, frame dropped");
        }
    }

    /// Convenience for terminal result frames.
    pub fn send_result(&self, task_id: &str, to: &str, payload: &ch_wire::ResultPayload) {
        self.send(Frame::result(task_id, to, payload));
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn change_seq(&self) -> u64 {
        self.shared.change_seq.load(Ordering::SeqCst)
    }

    pub fn identity(&self) -> NodeIdentity {
        self.shared.identity.lock().clone()
    }

    pub fn status(&self) -> HubStatus {
        let identity = self.identity();
        let cached_nodes = self
            .shared
            .node_cache
            .lock()
            .as_ref()
            .map(|cache| cache.nodes.len())
            .unwrap_or(0);
        HubStatus {
            registered: identity.is_registered(),
            connected: self.is_connected(),
            node_id: identity.node_id,
            cluster_id: identity.cluster_id,
            parent_id: identity.parent_id,
            pending_tasks: OUTBOX_DEPTH - self.outbox_tx.capacity(),
            cached_nodes,
            change_seq: self.change_seq(),
        }
    }

    // -- REST verbs --

    /// Register this node and adopt the issued identity.
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, HubError> {
        let issued: RegisterResponse =
            self.post_json("/api/nodes/register", &serde_json::to_value(&request).unwrap_or_default())
                .await?;
        {
            let mut identity = self.shared.identity.lock();
            identity.node_id = Some(issued.node_id.clone());
            identity.cluster_id = Some(issued.cluster_id.clone());
            identity.parent_id = issued.parent_id.clone();
            identity.token = Some(issued.token.clone());
            identity.node_name = request.name;
            identity.node_alias = request.alias;
            identity.capabilities = request.capabilities;
        }
        Ok(issued)
    }

    /// Register a child node. The issued identity belongs to the child and
    /// is not adopted as self.
    pub async fn register_child(
        &self,
        request: RegisterRequest,
    ) -> Result<RegisterResponse, HubError> {
        self.post_json("/api/nodes/register", &serde_json::to_value(&request).unwrap_or_default())
            .await
    }

    /// Unregister a node. Unregistering self clears identity and closes the
    /// uplink.
    pub async fn unregister(&self, node_id: &str) -> Result<(), HubError> {
        let _: Value = self.delete_json(&format!("/api/nodes/{}", node_id)).await?;
        let is_self = {
            let identity = self.shared.identity.lock();
            identity.node_id.as_deref() == Some(node_id)
        };
        if is_self {
            self.shared.identity.lock().clear();
            self.disconnect();
        }
        Ok(())
    }

    /// Move a node under a new parent (or to the root when `None`). A
    /// self-reparent may rotate the token.
    pub async fn reparent(
        &self,
        node_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<ReparentResponse, HubError> {
        let reply: ReparentResponse = self
            .patch_json(
                &format!("/api/nodes/{}/parent", node_id),
                &json!({ "newParentId": new_parent_id }),
            )
            .await?;
        let is_self = {
            let identity = self.shared.identity.lock();
            identity.node_id.as_deref() == Some(node_id)
        };
        if is_self {
            let mut identity = self.shared.identity.lock();
            identity.parent_id = reply.parent_id.clone();
            if let Some(token) = reply.token.clone() {
                identity.token = Some(token);
            }
        }
        self.shared.invalidate_node_cache();
        Ok(reply)
    }

    /// Update a node's display name or alias.
    pub async fn update_node(
        &self,
        node_id: &str,
        name: Option<&str>,
        alias: Option<&str>,
    ) -> Result<(), HubError> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert("name".into(), json!(name));
        }
        if let Some(alias) = alias {
            body.insert("alias".into(), json!(alias));
        }
        let _: Value =
            self.patch_json(&format!("/api/nodes/{}", node_id), &Value::Object(body)).await?;
        self.shared.invalidate_node_cache();
        Ok(())
    }

    /// Cluster directory with a 15-second cache; `force` bypasses it.
    pub async fn fetch_nodes(&self, force: bool) -> Result<Vec<PeerNode>, HubError> {
        if !force {
            let cache = self.shared.node_cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < NODE_CACHE_TTL {
                    return Ok(cached.nodes.clone());
                }
            }
        }
        let nodes: Vec<PeerNode> = self.get_json("/api/nodes").await?;
        *self.shared.node_cache.lock() =
            Some(NodeCache { fetched_at: Instant::now(), nodes: nodes.clone() });
        Ok(nodes)
    }

    /// Display name for a peer from the cache only; never triggers a fetch.
    pub fn cached_node_name(&self, node_id: &str) -> Option<String> {
        let cache = self.shared.node_cache.lock();
        let cached = cache.as_ref()?;
        if cached.fetched_at.elapsed() >= NODE_CACHE_TTL {
            return None;
        }
        cached.nodes.iter().find(|n| n.id == node_id).map(|n| n.name.clone())
    }

    pub async fn fetch_node(&self, node_id: &str) -> Result<PeerNode, HubError> {
        self.get_json(&format!("/api/nodes/{}", node_id)).await
    }

    pub async fn fetch_children(&self, node_id: &str) -> Result<Vec<PeerNode>, HubError> {
        self.get_json(&format!("/api/nodes/{}/children", node_id)).await
    }

    pub async fn fetch_tree(&self, node_id: &str) -> Result<Value, HubError> {
        self.get_json(&format!("/api/nodes/{}/tree", node_id)).await
    }

    pub async fn fetch_clusters(&self) -> Result<Value, HubError> {
        self.get_json("/api/clusters").await
    }

    pub async fn invite_code_get(&self, node_id: &str) -> Result<Option<String>, HubError> {
        let data: Value = self.get_json(&format!("/api/nodes/{}/invite-code", node_id)).await?;
        Ok(data.get("code").and_then(|c| c.as_str()).map(|s| s.to_string()))
    }

    pub async fn invite_code_set(
        &self,
        node_id: &str,
        code: Option<&str>,
    ) -> Result<Option<String>, HubError> {
        let data: Value = self
            .post_json(&format!("/api/nodes/{}/invite-code", node_id), &json!({ "code": code }))
            .await?;
        Ok(data.get("code").and_then(|c| c.as_str()).map(|s| s.to_string()))
    }

    pub async fn shared_config_get(&self, cluster_id: &str) -> Result<Value, HubError> {
        self.get_json(&format!("/api/clusters/{}/shared-config", cluster_id)).await
    }

    pub async fn shared_config_put(
        &self,
        cluster_id: &str,
        config: &Value,
    ) -> Result<(), HubError> {
        let _: Value =
            self.put_json(&format!("/api/clusters/{}/shared-config", cluster_id), config).await?;
        Ok(())
    }

    /// Health probe: GET `/` expecting `{"status": "running"}`.
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/", self.shared.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => match response.json::<Value>().await {
                Ok(body) => body.get("status").and_then(|s| s.as_str()) == Some("running"),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    // -- request plumbing --

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.shared.base_url, path));
        if let Some(token) = self.shared.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(admin_key) = self.shared.admin_key.as_ref() {
            builder = builder.header("X-Admin-Key", admin_key);
        }
        builder
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, HubError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, HubError> {
        let response = self.request(reqwest::Method::POST, path).json(body).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn patch_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, HubError> {
        let response = self.request(reqwest::Method::PATCH, path).json(body).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn put_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, HubError> {
        let response = self.request(reqwest::Method::PUT, path).json(body).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn delete_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, HubError> {
        let response = self.request(reqwest::Method::DELETE, path).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, HubError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(|s| s.to_string()))
                .unwrap_or(body);
            return Err(HubError::Api { status: status.as_u16(), message });
        }
        let envelope: ApiEnvelope = serde_json::from_str(&body)
            .map_err(|e| HubError::Api { status: status.as_u16(), message: e.to_string() })?;
        if !envelope.success {
            return Err(HubError::Api {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_else(|| "request rejected".into()),
            });
        }
        // Verbs without a payload reply `{success: true}`; Value targets
        // tolerate the null.
        serde_json::from_value(envelope.data.unwrap_or(Value::Null)).map_err(|e| {
            HubError::Api { status: status.as_u16(), message: format!("malformed data: {}", e) }
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
