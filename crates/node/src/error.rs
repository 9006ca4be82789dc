// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-level errors surfaced through verb replies.

use thiserror::Error;

use crate::agent::BridgeError;
use crate::hub::HubError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("not registered with a hub")]
    NotRegistered,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    #[error("agent bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("config error: {0}")]
    Config(String),
}
