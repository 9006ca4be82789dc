// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ch_core::{NodeEvent, NodeEventKind};

fn event(n: u64) -> FanoutEvent {
    FanoutEvent::NodeEvent {
        event: NodeEvent {
            node_id: "n-1".into(),
            node_name: None,
            event: NodeEventKind::Online,
            timestamp: n,
        },
    }
}

#[tokio::test]
async fn emit_without_subscriber_is_a_noop() {
    let fanout = Fanout::new();
    fanout.emit(event(1));
    assert!(!fanout.is_attached());
}

#[tokio::test]
async fn first_live_subscriber_wins() {
    let fanout = Fanout::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);

    assert!(fanout.attach(tx_a));
    assert!(!fanout.attach(tx_b));

    fanout.emit(event(1));
    assert_eq!(rx_a.recv().await.unwrap(), event(1));
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn slow_presenter_drops_instead_of_blocking() {
    let fanout = Fanout::new();
    let (tx, mut rx) = mpsc::channel(1);
    fanout.attach(tx);

    fanout.emit(event(1));
    fanout.emit(event(2)); // buffer full, dropped

    assert_eq!(rx.recv().await.unwrap(), event(1));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn closed_presenter_allows_relatch() {
    let fanout = Fanout::new();
    let (tx, rx) = mpsc::channel(1);
    fanout.attach(tx);
    drop(rx);

    // Emission on a closed channel clears the latch
    fanout.emit(event(1));
    assert!(!fanout.is_attached());

    let (tx2, mut rx2) = mpsc::channel(1);
    assert!(fanout.attach(tx2));
    fanout.emit(event(2));
    assert_eq!(rx2.recv().await.unwrap(), event(2));
}
