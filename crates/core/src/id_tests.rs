// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_uuid_is_v4_shaped() {
    let id = new_uuid();
    assert_eq!(id.len(), 36);
    assert_eq!(id.matches('-').count(), 4);
    // Version nibble
    assert_eq!(&id[14..15], "4");
}

#[test]
fn new_uuid_is_unique() {
    assert_ne!(new_uuid(), new_uuid());
}

#[test]
fn short_truncates_on_char_boundary() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
    assert_eq!(short("处理失败了", 2), "处理");
}

#[test]
fn session_keys_embed_their_ids() {
    assert_eq!(
        task_session_key("123e4567-e89b-42d3-a456-426614174000"),
        "agent:main:hub-task:123e4567-e89b-42d3-a456-426614174000"
    );
    assert_eq!(chat_session_key("node-a"), "hub-chat:node-a");
}
