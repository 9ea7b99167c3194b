use crate::*;

use lanlink_services::{bridge, BroadcasterTask};

/// Three clients, one of which has gone away: the other two get the event
/// and the dead one is dropped from the registry.
#[tokio::test]
async fn test_failed_client_removed_others_receive() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (task, clients) = BroadcasterTask::new(drain, shutdown_tx.subscribe());
    let broadcaster = tokio::spawn(task.run());

    let (_a, mut frames_a) = clients.connect(8, None);
    let (_b, frames_b) = clients.connect(8, None);
    let (_c, mut frames_c) = clients.connect(8, None);
    assert_eq!(clients.client_count().await, 3);

    // Client B's writer is gone; its queue is closed.
    drop(frames_b);

    tx.send_to(br#"{"kind":"chat","message":"hello all"}"#, node.addr).unwrap();
    assert_eq!(posted(&node.receive(1).unwrap()), 1);

    for frames in [&mut frames_a, &mut frames_c] {
        let frame = frames.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "chat");
        assert_eq!(v["text"], "hello all");
    }
    assert_eq!(clients.client_count().await, 2);

    shutdown_tx.send(()).unwrap();
    broadcaster.await.unwrap();
}

/// Events posted before shutdown are still delivered by the final drain.
#[tokio::test]
async fn test_shutdown_flushes_pending_events() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, drain) = bridge::channel();
    let mut node = Node::bind(poster.clone()).unwrap();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (task, clients) = BroadcasterTask::new(drain, shutdown_tx.subscribe());

    let (_id, mut frames) = clients.connect(16, None);
    for i in 0..3 {
        tx.send_to(format!("message {i}").as_bytes(), node.addr).unwrap();
    }
    assert_eq!(posted(&node.receive(3).unwrap()), 3);

    // The task only starts after shutdown has already been requested.
    shutdown_tx.send(()).unwrap();
    task.run().await;

    let mut texts = Vec::new();
    while let Ok(frame) = frames.try_recv() {
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        texts.push(v["text"].as_str().unwrap().to_string());
    }
    assert_eq!(texts, vec!["message 0", "message 1", "message 2"]);

    // The drain is closed now; the receive path reports it instead of
    // silently dropping the event.
    tx.send_to(b"late", node.addr).unwrap();
    assert_eq!(node.receive(1).unwrap(), vec![Disposition::BridgeClosed]);
    assert!(poster.is_closed());
    assert_eq!(node.pipeline.stats().snapshot().bridge_post_failures, 1);
}
