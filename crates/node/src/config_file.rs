// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user's `openclaw.json`.
//!
//! The file belongs to the wider runtime and holds unrelated settings, so
//! this module only ever deep-merges the plugin's block into it: object
//! branches merge, arrays and scalars replace. Identity mutations call
//! [`save`] right after the hub reply.

use std::path::{Path, PathBuf};

use ch_core::{merge_patch, NodeConfig};
use serde_json::Value;

use crate::error::NodeError;

/// `$OPENCLAW_HOME`, defaulting to `~/.openclaw`.
pub fn openclaw_home() -> Result<PathBuf, NodeError> {
    if let Ok(home) = std::env::var("OPENCLAW_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = std::env::var("HOME")
        .map_err(|_| NodeError::Config("cannot resolve home directory".into()))?;
    Ok(PathBuf::from(home).join(".openclaw"))
}

pub fn default_config_path() -> Result<PathBuf, NodeError> {
    Ok(openclaw_home()?.join("openclaw.json"))
}

pub fn default_data_dir() -> Result<PathBuf, NodeError> {
    Ok(openclaw_home()?.join("hub-data"))
}

/// Load the plugin config block. A missing or malformed file yields
/// defaults; the node can still start and register later.
pub fn load(path: &Path) -> NodeConfig {
    let root = read_root(path);
    NodeConfig::from_config_file(&root)
}

/// Merge the plugin block back into the file, preserving everything else.
pub fn save(path: &Path, config: &NodeConfig) -> Result<(), NodeError> {
    let mut root = read_root(path);
    merge_patch(&mut root, &config.to_config_patch());

    let bytes = serde_json::to_vec_pretty(&root)
        .map_err(|e| NodeError::Config(format!("serialize config: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| NodeError::Config(format!("create config dir: {}", e)))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &bytes).map_err(|e| NodeError::Config(format!("write config: {}", e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| NodeError::Config(format!("replace config: {}", e)))?;
    Ok(())
}

fn read_root(path: &Path) -> Value {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| Value::Object(Default::default()))
}

#[cfg(test)]
#[path = "config_file_tests.rs"]
mod tests;
