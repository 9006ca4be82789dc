// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID and session-key helpers.
//!
//! Task and chat-message ids are UUID v4 strings; they travel end-to-end on
//! the hub wire, so no local prefix scheme is applied.

use uuid::Uuid;

/// Generate a fresh UUID v4 string.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Agent session key for a hub task. One session per task id.
pub fn task_session_key(task_id: &str) -> String {
    format!("agent:main:hub-task:{}", task_id)
}

/// Agent session key for peer chat. One session per peer, so conversation
/// context carries across turns.
pub fn chat_session_key(peer_id: &str) -> String {
    format!("hub-chat:{}", peer_id)
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
