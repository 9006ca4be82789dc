// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub wire protocol.
//!
//! Frames are JSON objects
//! `{type, id, from?, to?, channel?, payload, timestamp?}` carried as text
//! messages on the hub WebSocket. For task-family frames `id` is the task id
//! end-to-end; chat frames mint a fresh UUID per message.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod payload;

pub use frame::{Frame, FrameType};
pub use payload::{
    parse_system_broadcast, AckStatus, ChatConfig, ChatEntry, ChatPayload, ChatWireRole,
    DirectPayload, HeartbeatPayload, ResultPayload, SystemBroadcast, TaskAckPayload,
    TaskCancelPayload, TaskPayload, TaskQueueHints, TaskStatusPayload,
};
