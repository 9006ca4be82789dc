// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! clawhub-node: the cluster node daemon.
//!
//! Loads the plugin config from `openclaw.json`, opens the stores, wires
//! the coordinator, serves presenters on a Unix socket, and holds the hub
//! uplink while registered. SIGINT/SIGTERM flush the stores and exit.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::UnixListener;

use ch_core::SystemClock;
use ch_node::agent::GatewayBridge;
use ch_node::{config_file, listener, Coordinator};
use ch_storage::Stores;

#[derive(Parser)]
#[command(name = "clawhub-node", about = "Cluster node daemon for the openclaw runtime")]
struct Args {
    /// Path to openclaw.json (defaults to ~/.openclaw/openclaw.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory (defaults to ~/.openclaw/hub-data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Presenter socket path (defaults to <data-dir>/node.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log filter, e.g. "info" or "ch_node=debug"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config_path = match args.config {
        Some(path) => path,
        None => config_file::default_config_path()?,
    };
    let config = config_file::load(&config_path);

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => config_file::default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    let socket_path = args.socket.unwrap_or_else(|| data_dir.join("node.sock"));

    let stores = Stores::open(&data_dir);
    let bridge = Arc::new(GatewayBridge::new(config.gateway_port, config.gateway_token.clone()));
    let (coordinator, runtime) =
        Coordinator::new(config, config_path, stores, bridge, SystemClock);

    let pump = coordinator.clone();
    tokio::spawn(async move { pump.run(runtime).await });

    if coordinator.is_registered() {
        coordinator.connect();
    } else {
        tracing::info!("no identity yet; use the register verb to join a cluster");
    }

    // A stale socket from an unclean exit would fail the bind.
    let _ = std::fs::remove_file(&socket_path);
    let unix_listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("bind {}", socket_path.display()))?;
    tracing::info!(socket = %socket_path.display(), "clawhub node ready");

    let served = coordinator.clone();
    tokio::spawn(async move { listener::serve(unix_listener, served).await });

    shutdown_signal().await;

    tracing::info!("shutting down");
    coordinator.flush();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = args
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            match sigterm.as_mut() {
                Some(sigterm) => { sigterm.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => {}
    }
}
