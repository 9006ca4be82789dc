// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WebSocket uplink task.
//!
//! One long-lived task owns the socket for its whole life: it connects when
//! a connection is desired, pumps inbound frames through the router, drains
//! the outbox, emits heartbeats, and re-arms a fixed-interval reconnect
//! after unintentional closes. Flipping the desired flag off closes the
//! socket without re-arming.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use ch_wire::Frame;

use super::events::HubEvent;
use super::route::route_frame;
use super::{HubError, HubShared, LoadSnapshot};

/// Build the uplink URL: `wss://<hub>/ws?token=<urlencoded>`.
pub(crate) fn ws_url(base_url: &str, token: &str) -> Result<String, HubError> {
    let mut url = url::Url::parse(base_url).map_err(|e| HubError::BadUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(HubError::BadUrl(format!("unsupported scheme: {}", other))),
    };
    url.set_scheme(scheme).map_err(|_| HubError::BadUrl(base_url.into()))?;
    url.set_path("/ws");
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url.to_string())
}

pub(crate) async fn run_uplink(
    shared: Arc<HubShared>,
    mut outbox_rx: mpsc::Receiver<Frame>,
    events_tx: mpsc::Sender<HubEvent>,
    mut desired_rx: watch::Receiver<bool>,
    load: LoadSnapshot,
) {
    loop {
        // Park until a connection is wanted.
        while !*desired_rx.borrow() {
            if desired_rx.changed().await.is_err() {
                return;
            }
        }

        let Some(token) = shared.token() else {
            tracing::warn!("uplink requested without a token, waiting for registration");
            tokio::time::sleep(shared.reconnect_interval).await;
            continue;
        };
        let url = match ws_url(&shared.base_url, &token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "cannot build uplink url");
                tokio::time::sleep(shared.reconnect_interval).await;
                continue;
            }
        };

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _)) => {
                tracing::info!("hub uplink connected");
                shared.set_connected(true);
                if events_tx.send(HubEvent::Connected).await.is_err() {
                    return;
                }
                session(&shared, ws, &mut outbox_rx, &events_tx, &mut desired_rx, &load).await;
                shared.set_connected(false);
                if events_tx.send(HubEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "hub connect failed");
            }
        }

        // Fixed-interval reconnect, armed once per close, suppressed after
        // an intentional disconnect.
        if *desired_rx.borrow() {
            tokio::time::sleep(shared.reconnect_interval).await;
        }
    }
}

async fn session(
    shared: &HubShared,
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    outbox_rx: &mut mpsc::Receiver<Frame>,
    events_tx: &mpsc::Sender<HubEvent>,
    desired_rx: &mut watch::Receiver<bool>,
    load: &LoadSnapshot,
) {
    let (mut write, mut read) = ws.split();
    let mut heartbeat = tokio::time::interval(shared.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; the hub learns our load right away.

    loop {
        tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let Some(frame) = Frame::decode(&text) else {
                            tracing::debug!("undecodable hub frame, dropped");
                            continue;
                        };
                        for event in route_frame(frame, shared) {
                            if events_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "hub closed the socket");
                        return;
                    }
                    Some(Ok(_)) => {} // Ping/Pong/Binary, ignore
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "hub socket error");
                        return;
                    }
                    None => {
                        tracing::info!("hub stream ended");
                        return;
                    }
                }
            }

            outbound = outbox_rx.recv() => {
                let Some(frame) = outbound else { return };
                if let Err(e) = write.send(Message::Text(frame.encode())).await {
                    tracing::warn!(error = %e, "hub send failed, closing session");
                    return;
                }
            }

            _ = heartbeat.tick() => {
                let frame = Frame::heartbeat(&load());
                if let Err(e) = write.send(Message::Text(frame.encode())).await {
                    tracing::warn!(error = %e, "heartbeat send failed, closing session");
                    return;
                }
            }

            changed = desired_rx.changed() => {
                if changed.is_err() || !*desired_rx.borrow() {
                    tracing::info!("closing hub uplink intentionally");
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
