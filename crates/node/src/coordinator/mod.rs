// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator wires stores, hub client, queue, and chat handler
//! together and exposes the verb surface.
//!
//! Ownership is one-way: the hub client and the queue emit into channels;
//! the coordinator pumps both in [`Coordinator::run`]. Nothing below holds
//! a reference back up.

mod hub_events;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ch_core::{
    merge_patch, ChatRole, Clock, FanoutEvent, NodeConfig, SelfTaskMode, StoredTask, TaskSource,
    TaskStatus,
};
use ch_storage::{Stores, TaskFilter};
use ch_wire::{ChatConfig, ChatPayload, Frame, HeartbeatPayload, TaskCancelPayload, TaskPayload};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::{execute_locally, AgentBridge};
use crate::chat::ChatHandler;
use crate::config_file;
use crate::error::NodeError;
use crate::fanout::Fanout;
use crate::hub::{HubClient, HubEvent, RegisterRequest};
use crate::protocol::{NodeStatus, Request, Response};
use crate::queue::TaskQueue;

/// Depth of the frame channel between queue/chat and the hub client.
const FRAME_DEPTH: usize = 256;

/// Channels the coordinator pumps; handed to [`Coordinator::run`].
pub struct CoordinatorRuntime {
    pub hub_events: mpsc::Receiver<HubEvent>,
    pub frames: mpsc::Receiver<Frame>,
}

pub struct Coordinator<B, C: Clock> {
    inner: Arc<Inner<B, C>>,
}

impl<B, C: Clock> Clone for Coordinator<B, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<B, C: Clock> {
    config_path: PathBuf,
    config: Mutex<NodeConfig>,
    hub: HubClient,
    bridge: Arc<B>,
    clock: C,
    stores: Stores,
    queue: TaskQueue<B, C>,
    chat: ChatHandler<B, C>,
    fanout: Fanout,
    shared_config: Mutex<Option<Value>>,
    /// Guards one-time connector registration on shared-config push.
    connectors_latched: AtomicBool,
}

impl<B, C> Coordinator<B, C>
where
    B: AgentBridge,
    C: Clock,
{
    pub fn new(
        config: NodeConfig,
        config_path: PathBuf,
        stores: Stores,
        bridge: Arc<B>,
        clock: C,
    ) -> (Self, CoordinatorRuntime) {
        let (hub, hub_events) = HubClient::new(&config);
        let (frame_tx, frames) = mpsc::channel(FRAME_DEPTH);
        let fanout = Fanout::new();

        let queue = TaskQueue::new(
            Arc::clone(&bridge),
            clock.clone(),
            stores.received.clone(),
            frame_tx.clone(),
            config.max_concurrent,
            config.task_timeout_ms,
        );
        let chat = ChatHandler::new(
            Arc::clone(&bridge),
            clock.clone(),
            stores.chats.clone(),
            fanout.clone(),
            frame_tx,
        );

        let coordinator = Self {
            inner: Arc::new(Inner {
                config_path,
                config: Mutex::new(config),
                hub,
                bridge,
                clock,
                stores,
                queue,
                chat,
                fanout,
                shared_config: Mutex::new(None),
                connectors_latched: AtomicBool::new(false),
            }),
        };
        (coordinator, CoordinatorRuntime { hub_events, frames })
    }

    /// Pump hub events and outbound frames until both channels close.
    pub async fn run(&self, mut runtime: CoordinatorRuntime) {
        loop {
            tokio::select! {
                event = runtime.hub_events.recv() => match event {
                    Some(event) => self.handle_hub_event(event).await,
                    None => break,
                },
                frame = runtime.frames.recv() => match frame {
                    Some(frame) => self.inner.hub.send(frame),
                    None => break,
                },
            }
        }
    }

    /// Open the hub uplink; heartbeats report the queue's running count.
    pub fn connect(&self) {
        let queue = self.inner.queue.clone();
        self.inner.hub.connect(Arc::new(move || HeartbeatPayload {
            load: 0.0,
            active_tasks: queue.active_count(),
        }));
    }

    pub fn fanout(&self) -> &Fanout {
        &self.inner.fanout
    }

    pub fn is_registered(&self) -> bool {
        self.inner.hub.identity().is_registered()
    }

    /// Flush every store synchronously. Called on shutdown.
    pub fn flush(&self) {
        self.inner.stores.flush_all();
    }

    /// Dispatch one presenter request. Failures become `Error { message }`.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.try_dispatch(request).await {
            Ok(response) => response,
            Err(error) => Response::Error { message: error.to_string() },
        }
    }

    async fn try_dispatch(&self, request: Request) -> Result<Response, NodeError> {
        match request {
            Request::Ping => Ok(Response::Pong),

            Request::Status => Ok(Response::Status {
                status: Box::new(NodeStatus {
                    hub: self.inner.hub.status(),
                    queue: self.inner.queue.status(),
                    sent_tasks: self.inner.stores.tasks.summary(),
                }),
            }),

            Request::Connect => {
                self.connect();
                Ok(Response::Ok)
            }

            Request::Disconnect => {
                self.inner.hub.disconnect();
                Ok(Response::Ok)
            }

            Request::ConfigGet => {
                Ok(Response::Config { config: Box::new(self.inner.config.lock().clone()) })
            }

            Request::ConfigSet { patch } => self.config_set(patch).await,

            Request::Nodes { force } => {
                Ok(Response::Nodes { nodes: self.inner.hub.fetch_nodes(force).await? })
            }

            Request::NodeGet { node_id } => {
                Ok(Response::Node { node: Box::new(self.inner.hub.fetch_node(&node_id).await?) })
            }

            Request::NodeUpdate { name, alias } => self.node_update(name, alias).await,

            Request::Tree => {
                let node_id = self.require_node_id()?;
                Ok(Response::TreeData { data: self.inner.hub.fetch_tree(&node_id).await? })
            }

            Request::Children => {
                let node_id = self.require_node_id()?;
                Ok(Response::Nodes { nodes: self.inner.hub.fetch_children(&node_id).await? })
            }

            Request::Clusters => {
                Ok(Response::TreeData { data: self.inner.hub.fetch_clusters().await? })
            }

            Request::Register { name, alias, parent_id, cluster_id, invite_code } => {
                self.register(name, alias, parent_id, cluster_id, invite_code).await
            }

            Request::RegisterChild { name, alias, invite_code } => {
                let issued = self
                    .inner
                    .hub
                    .register_child(RegisterRequest {
                        name,
                        alias,
                        invite_code,
                        parent_id: self.inner.hub.identity().node_id,
                        cluster_id: self.inner.hub.identity().cluster_id,
                        capabilities: Vec::new(),
                    })
                    .await?;
                Ok(Response::Registered {
                    node_id: issued.node_id,
                    cluster_id: issued.cluster_id,
                    parent_id: issued.parent_id,
                    depth: issued.depth,
                })
            }

            Request::Unregister { node_id } => self.unregister(node_id).await,

            Request::Reparent { node_id, new_parent_id } => {
                self.inner.hub.reparent(&node_id, new_parent_id.as_deref()).await?;
                if self.inner.hub.identity().node_id.as_deref() == Some(node_id.as_str()) {
                    self.persist_identity()?;
                }
                Ok(Response::Ok)
            }

            Request::InviteCodeGet => {
                let node_id = self.require_node_id()?;
                Ok(Response::InviteCode {
                    code: self.inner.hub.invite_code_get(&node_id).await?,
                })
            }

            Request::InviteCodeSet { code } => {
                let node_id = self.require_node_id()?;
                Ok(Response::InviteCode {
                    code: self.inner.hub.invite_code_set(&node_id, code.as_deref()).await?,
                })
            }

            Request::SharedConfigGet => {
                let cluster_id = self
                    .inner
                    .hub
                    .identity()
                    .cluster_id
                    .ok_or(NodeError::NotRegistered)?;
                match self.inner.hub.shared_config_get(&cluster_id).await {
                    Ok(config) => Ok(Response::SharedConfig { config: Some(config) }),
                    // Fall back to the last pushed copy when the hub is out
                    // of reach.
                    Err(e) => match self.inner.shared_config.lock().clone() {
                        Some(config) => Ok(Response::SharedConfig { config: Some(config) }),
                        None => Err(e.into()),
                    },
                }
            }

            Request::SharedConfigSet { config } => {
                let cluster_id = self
                    .inner
                    .hub
                    .identity()
                    .cluster_id
                    .ok_or(NodeError::NotRegistered)?;
                self.inner.hub.shared_config_put(&cluster_id, &config).await?;
                *self.inner.shared_config.lock() = Some(config);
                Ok(Response::Ok)
            }

            Request::TaskSend { node_id, instruction } => {
                let task = self.task_send(&node_id, &instruction).await?;
                Ok(Response::TaskSent { task: Box::new(task) })
            }

            Request::TaskList { node_id, status, limit } => {
                let status = match status.as_deref() {
                    Some(s) => Some(TaskStatus::parse(s).ok_or_else(|| {
                        NodeError::InvalidRequest(format!("unknown status: {}", s))
                    })?),
                    None => None,
                };
                Ok(Response::Tasks {
                    tasks: self.inner.stores.tasks.list(&TaskFilter { node_id, status, limit }),
                })
            }

            Request::TaskGet { task_id } => match self.inner.stores.tasks.get(&task_id) {
                Some(task) => Ok(Response::Task { task: Box::new(task) }),
                None => Err(NodeError::TaskNotFound(task_id)),
            },

            Request::TaskCancel { task_id } => {
                Ok(Response::TaskCancelled { cancelled: self.task_cancel(&task_id).await })
            }

            Request::TaskClear { before } => {
                Ok(Response::TasksCleared {
                    cleared: self.inner.stores.tasks.clear_completed(before),
                })
            }

            Request::TaskBatch { tasks } => {
                let mut sent = Vec::with_capacity(tasks.len());
                for spec in tasks {
                    sent.push(self.task_send(&spec.node_id, &spec.instruction).await?);
                }
                Ok(Response::TasksSent { tasks: sent })
            }

            Request::ChatSend { node_id, content, whole, auto_refresh_ms } => {
                let message = self.chat_send(&node_id, &content, whole, auto_refresh_ms);
                Ok(Response::ChatSent { message })
            }

            Request::ChatHistory { node_id, limit } => Ok(Response::ChatMessages {
                messages: self.inner.stores.chats.history(&node_id, limit),
            }),

            Request::ChatList => {
                Ok(Response::ChatPeers { nodes: self.inner.stores.chats.active_nodes() })
            }

            Request::ChatClear { node_id } => {
                self.inner.stores.chats.clear(&node_id);
                Ok(Response::Ok)
            }

            Request::NodeEvents { limit } => {
                Ok(Response::NodeEvents { events: self.inner.stores.node_events.recent(limit) })
            }

            // The listener handles subscription streaming; reaching here
            // just acknowledges.
            Request::Subscribe => Ok(Response::Subscribed),
        }
    }

    // -- task verbs --

    /// Send a task. Self-targeted tasks short-circuit to the local agent in
    /// local mode; everything else goes out as a `task` frame.
    async fn task_send(&self, node_id: &str, instruction: &str) -> Result<StoredTask, NodeError> {
        let now = self.inner.clock.epoch_ms();
        let task_id = ch_core::new_uuid();
        let identity = self.inner.hub.identity();
        let is_self = identity.node_id.as_deref() == Some(node_id);
        let self_task_mode = self.inner.config.lock().self_task_mode;

        if is_self && self_task_mode == SelfTaskMode::Local {
            let mut task =
                StoredTask::new(&task_id, node_id, instruction, TaskSource::Local, now);
            task.target_node_name = Some(identity.node_name.clone());
            self.inner.stores.tasks.record_sent(task.clone());
            self.emit_task_update(task.clone());

            let coordinator = self.clone();
            let instruction = instruction.to_string();
            tokio::spawn(async move {
                let timeout_ms = coordinator.inner.config.lock().task_timeout_ms;
                let outcome = execute_locally(
                    coordinator.inner.bridge.as_ref(),
                    &task_id,
                    &instruction,
                    timeout_ms,
                )
                .await;
                let at = coordinator.inner.clock.epoch_ms();
                if let Some(updated) = coordinator.inner.stores.tasks.record_result(
                    &task_id,
                    outcome.success,
                    outcome.result,
                    outcome.error,
                    at,
                ) {
                    coordinator.emit_task_update(updated);
                }
            });
            return Ok(task);
        }

        let mut task = StoredTask::new(&task_id, node_id, instruction, TaskSource::Remote, now);
        task.target_node_name = self.inner.hub.cached_node_name(node_id);
        self.inner.stores.tasks.record_sent(task.clone());
        self.emit_task_update(task.clone());

        self.inner.hub.send(Frame::task(
            &task_id,
            node_id,
            &TaskPayload { task: instruction.to_string(), priority: Default::default(), config: None },
        ));
        Ok(task)
    }

    /// Cancel locally (tasks this node executes) and remotely (tasks this
    /// node sent that are not yet terminal).
    async fn task_cancel(&self, task_id: &str) -> bool {
        let mut cancelled = self.inner.queue.cancel(task_id).await;

        if let Some(task) = self.inner.stores.tasks.get(task_id) {
            if !task.status.is_terminal() {
                self.inner.hub.send(Frame::task_cancel(
                    task_id,
                    &task.target_node_id,
                    &TaskCancelPayload::default(),
                ));
                let now = self.inner.clock.epoch_ms();
                if let Some(updated) = self.inner.stores.tasks.cancel(task_id, now) {
                    self.emit_task_update(updated);
                }
                cancelled = true;
            }
        }
        cancelled
    }

    // -- chat verbs --

    fn chat_send(
        &self,
        node_id: &str,
        content: &str,
        whole: Option<bool>,
        auto_refresh_ms: Option<u64>,
    ) -> ch_core::ChatMessage {
        let now = self.inner.clock.epoch_ms();
        let message = self.inner.stores.chats.append(node_id, ChatRole::User, content, now);
        self.inner.fanout.emit(FanoutEvent::ChatMessage {
            node_id: node_id.to_string(),
            message: message.clone(),
        });

        let payload = ChatPayload::user(
            content,
            ChatConfig { whole: whole.unwrap_or(false), auto_refresh_ms },
            now,
        );
        self.inner.hub.send(Frame::chat(node_id, &payload));
        message
    }

    // -- identity verbs --

    async fn register(
        &self,
        name: Option<String>,
        alias: Option<String>,
        parent_id: Option<String>,
        cluster_id: Option<String>,
        invite_code: Option<String>,
    ) -> Result<Response, NodeError> {
        let (default_name, default_alias, capabilities) = {
            let config = self.inner.config.lock();
            (config.node_name.clone(), config.node_alias.clone(), config.capabilities.clone())
        };
        let issued = self
            .inner
            .hub
            .register(RegisterRequest {
                name: name.unwrap_or(default_name),
                alias: alias.or(default_alias),
                parent_id,
                cluster_id,
                invite_code,
                capabilities,
            })
            .await?;
        self.persist_identity()?;
        Ok(Response::Registered {
            node_id: issued.node_id,
            cluster_id: issued.cluster_id,
            parent_id: issued.parent_id,
            depth: issued.depth,
        })
    }

    async fn unregister(&self, node_id: Option<String>) -> Result<Response, NodeError> {
        let target = match node_id.or(self.inner.hub.identity().node_id) {
            Some(id) => id,
            None => return Err(NodeError::NotRegistered),
        };
        self.inner.hub.unregister(&target).await?;
        if !self.inner.hub.identity().is_registered() {
            self.persist_identity()?;
        }
        Ok(Response::Ok)
    }

    async fn node_update(
        &self,
        name: Option<String>,
        alias: Option<String>,
    ) -> Result<Response, NodeError> {
        let node_id = self.require_node_id()?;
        self.inner.hub.update_node(&node_id, name.as_deref(), alias.as_deref()).await?;
        {
            let mut config = self.inner.config.lock();
            if let Some(name) = name {
                config.node_name = name;
            }
            if let Some(alias) = alias {
                config.node_alias = Some(alias);
            }
        }
        self.save_config()?;
        Ok(Response::Ok)
    }

    async fn config_set(&self, patch: Value) -> Result<Response, NodeError> {
        let updated = {
            let config = self.inner.config.lock();
            let mut value = serde_json::to_value(&*config)
                .map_err(|e| NodeError::Config(e.to_string()))?;
            merge_patch(&mut value, &patch);
            serde_json::from_value::<NodeConfig>(value)
                .map_err(|e| NodeError::InvalidRequest(format!("bad config patch: {}", e)))?
        };
        *self.inner.config.lock() = updated.clone();
        self.save_config()?;
        self.inner.queue.set_max_concurrent(updated.max_concurrent).await;
        Ok(Response::Config { config: Box::new(updated) })
    }

    // -- shared helpers --

    pub(crate) async fn handle_hub_event(&self, event: HubEvent) {
        hub_events::handle(self, event).await
    }

    fn emit_task_update(&self, task: StoredTask) {
        self.inner.fanout.emit(FanoutEvent::TaskUpdate { task });
    }

    fn require_node_id(&self) -> Result<String, NodeError> {
        self.inner.hub.identity().node_id.ok_or(NodeError::NotRegistered)
    }

    /// Copy the hub-held identity into config and write it back to disk.
    fn persist_identity(&self) -> Result<(), NodeError> {
        let identity = self.inner.hub.identity();
        {
            let mut config = self.inner.config.lock();
            config.set_identity(&identity);
        }
        self.save_config()
    }

    fn save_config(&self) -> Result<(), NodeError> {
        let config = self.inner.config.lock().clone();
        config_file::save(&self.inner.config_path, &config)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
