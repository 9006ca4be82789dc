// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener for presenter connections.
//!
//! Each connection is a loop of length-prefixed request/response pairs. A
//! `Subscribe` request turns the connection into the fan-out stream: the
//! socket latches the single presenter channel and receives events until it
//! closes.

use ch_core::Clock;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use crate::agent::AgentBridge;
use crate::coordinator::Coordinator;
use crate::protocol::{decode, encode, read_message, write_message, Request, Response};

/// Buffer between the fan-out latch and a subscribed presenter.
const SUBSCRIBER_DEPTH: usize = 256;

pub async fn serve<B, C>(listener: UnixListener, coordinator: Coordinator<B, C>)
where
    B: AgentBridge,
    C: Clock,
{
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { handle_connection(stream, coordinator).await });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_connection<B, C>(mut stream: UnixStream, coordinator: Coordinator<B, C>)
where
    B: AgentBridge,
    C: Clock,
{
    loop {
        let bytes = match read_message(&mut stream).await {
            Ok(bytes) => bytes,
            // EOF or a broken pipe ends the connection quietly.
            Err(_) => return,
        };

        let request: Request = match decode(&bytes) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable presenter request");
                if respond(&mut stream, &Response::Error { message: format!("bad request: {}", e) })
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
        };

        if matches!(request, Request::Subscribe) {
            subscribe(&mut stream, &coordinator).await;
            return;
        }

        let response = coordinator.dispatch(request).await;
        if respond(&mut stream, &response).await.is_err() {
            return;
        }
    }
}

/// Latch this connection as the fan-out presenter and stream events until
/// the socket drops.
async fn subscribe<B, C>(stream: &mut UnixStream, coordinator: &Coordinator<B, C>)
where
    B: AgentBridge,
    C: Clock,
{
    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_DEPTH);
    if !coordinator.fanout().attach(tx) {
        let _ = respond(
            stream,
            &Response::Error { message: "another presenter is already subscribed".into() },
        )
        .await;
        return;
    }
    if respond(stream, &Response::Subscribed).await.is_err() {
        return;
    }
    tracing::info!("presenter subscribed to fan-out");

    while let Some(event) = rx.recv().await {
        if respond(stream, &Response::Event { event }).await.is_err() {
            tracing::info!("presenter disconnected from fan-out");
            return;
        }
    }
}

async fn respond(
    stream: &mut UnixStream,
    response: &Response,
) -> Result<(), crate::protocol::ProtocolError> {
    let bytes = encode(response)?;
    write_message(stream, &bytes).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
