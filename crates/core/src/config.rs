// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable node configuration.
//!
//! Identity lives inside the user's `openclaw.json` under
//! [`PLUGIN_CONFIG_PATH`]. The file holds unrelated settings too, so writes
//! go through [`merge_patch`]: objects merge recursively, arrays and scalars
//! replace wholly.

use crate::node::NodeIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dotted path of this plugin's config object inside `openclaw.json`.
pub const PLUGIN_CONFIG_PATH: [&str; 4] = ["plugins", "entries", "cluster-hub", "config"];

/// Routing mode for tasks targeting this node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfTaskMode {
    /// Short-circuit to the local agent bridge.
    #[default]
    Local,
    /// Always round-trip through the hub.
    Hub,
}

fn default_gateway_port() -> u16 {
    18789
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_interval_ms() -> u64 {
    5_000
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

/// The plugin's config block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub hub_url: String,
    pub node_id: Option<String>,
    pub node_name: String,
    pub node_alias: Option<String>,
    pub token: Option<String>,
    pub cluster_id: Option<String>,
    pub parent_id: Option<String>,
    pub capabilities: Vec<String>,
    pub self_task_mode: SelfTaskMode,
    /// Hub admin key, sent as `X-Admin-Key` when present.
    pub admin_key: Option<String>,
    /// Local agent gateway RPC port.
    pub gateway_port: u16,
    pub gateway_token: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_concurrent: u32,
    pub task_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hub_url: String::new(),
            node_id: None,
            node_name: String::new(),
            node_alias: None,
            token: None,
            cluster_id: None,
            parent_id: None,
            capabilities: Vec::new(),
            self_task_mode: SelfTaskMode::default(),
            admin_key: None,
            gateway_port: default_gateway_port(),
            gateway_token: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_concurrent: default_max_concurrent(),
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

impl NodeConfig {
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node_id.clone(),
            node_name: self.node_name.clone(),
            node_alias: self.node_alias.clone(),
            cluster_id: self.cluster_id.clone(),
            parent_id: self.parent_id.clone(),
            token: self.token.clone(),
            capabilities: self.capabilities.clone(),
        }
    }

    pub fn set_identity(&mut self, identity: &NodeIdentity) {
        self.node_id = identity.node_id.clone();
        self.node_name = identity.node_name.clone();
        self.node_alias = identity.node_alias.clone();
        self.cluster_id = identity.cluster_id.clone();
        self.parent_id = identity.parent_id.clone();
        self.token = identity.token.clone();
        self.capabilities = identity.capabilities.clone();
    }

    /// Extract this plugin's block from a full `openclaw.json` value.
    /// Missing or malformed blocks yield defaults.
    pub fn from_config_file(root: &Value) -> Self {
        let mut cursor = root;
        for key in PLUGIN_CONFIG_PATH {
            match cursor.get(key) {
                Some(next) => cursor = next,
                None => return Self::default(),
            }
        }
        serde_json::from_value(cursor.clone()).unwrap_or_default()
    }

    /// Build a patch for the full config file containing only this plugin's
    /// block, suitable for [`merge_patch`] onto the existing file value.
    pub fn to_config_patch(&self) -> Value {
        let mut patch = serde_json::to_value(self).unwrap_or_else(|_| Value::Null);
        for key in PLUGIN_CONFIG_PATH.iter().rev() {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert((*key).to_string(), patch);
            patch = Value::Object(wrapper);
        }
        patch
    }
}

/// Recursive merge: object branches merge key-by-key, everything else
/// (arrays included) replaces the base value.
pub fn merge_patch(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_patch(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
