// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn load_missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let config = load(&dir.path().join("openclaw.json"));
    assert_eq!(config, NodeConfig::default());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openclaw.json");

    let mut config = NodeConfig { hub_url: "https://hub".into(), ..Default::default() };
    config.node_id = Some("n-1".into());
    config.token = Some("tok".into());
    save(&path, &config).unwrap();

    assert_eq!(load(&path), config);
}

#[test]
fn save_preserves_unrelated_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openclaw.json");
    std::fs::write(
        &path,
        serde_json::to_vec_pretty(&json!({
            "theme": "dark",
            "plugins": { "entries": { "other": { "enabled": true } } }
        }))
        .unwrap(),
    )
    .unwrap();

    let config = NodeConfig { node_name: "alpha".into(), ..Default::default() };
    save(&path, &config).unwrap();

    let root: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(root["theme"], "dark");
    assert_eq!(root["plugins"]["entries"]["other"]["enabled"], true);
    assert_eq!(
        root["plugins"]["entries"]["cluster-hub"]["config"]["nodeName"],
        "alpha"
    );
}

#[test]
fn save_overwrites_previous_identity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openclaw.json");

    let mut config = NodeConfig::default();
    config.node_id = Some("n-old".into());
    save(&path, &config).unwrap();

    config.node_id = Some("n-new".into());
    save(&path, &config).unwrap();

    assert_eq!(load(&path).node_id.as_deref(), Some("n-new"));
}

#[test]
fn malformed_file_is_treated_as_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openclaw.json");
    std::fs::write(&path, b"{ broken").unwrap();

    assert_eq!(load(&path), NodeConfig::default());

    // Saving replaces the broken file with a valid one
    save(&path, &NodeConfig::default()).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&std::fs::read(&path).unwrap()).is_ok());
}
