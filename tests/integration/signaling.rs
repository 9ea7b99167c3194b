use crate::*;

use lanlink_core::CanonicalEvent;
use lanlink_services::fragment::encode_datagrams;
use lanlink_services::{bridge, classifier, BroadcasterTask};

fn next_frame_json(frame: Option<std::sync::Arc<str>>) -> serde_json::Value {
    let frame = frame.expect("client queue closed");
    serde_json::from_str(&frame).expect("frame is JSON")
}

/// A legacy call request sent over UDP reaches a live client as a
/// `call_request` envelope.
#[tokio::test]
async fn test_legacy_call_request_reaches_client() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (task, clients) = BroadcasterTask::new(drain, shutdown_tx.subscribe());
    let broadcaster = tokio::spawn(task.run());

    let (_id, mut frames) = clients.connect(8, None);
    assert_eq!(clients.client_count().await, 1);

    tx.send_to(b"CALL_REQUEST:node-2:video", node.addr).unwrap();
    assert_eq!(node.receive(1).unwrap(), vec![Disposition::Posted("call_request")]);

    let v = next_frame_json(frames.recv().await);
    assert_eq!(v["type"], "call_request");
    assert_eq!(v["call_type"], "video");
    assert_eq!(v["caller"], "node-2");
    assert_eq!(v["source_ip"], "127.0.0.1");
    assert!(v["timestamp"].is_string());

    shutdown_tx.send(()).unwrap();
    broadcaster.await.unwrap();
}

/// A large WebRTC offer is fragmented on the way out and delivered to the
/// client with the signal object untouched.
#[tokio::test]
async fn test_fragmented_webrtc_offer_passthrough() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (task, clients) = BroadcasterTask::new(drain, shutdown_tx.subscribe());
    let broadcaster = tokio::spawn(task.run());
    let (_id, mut frames) = clients.connect(8, None);

    let sdp = format!("v=0\r\n{}", "a=candidate:1 1 UDP 2122252543 10.0.0.2 54321 typ host\r\n".repeat(40));
    let signal = serde_json::json!({ "type": "offer", "sdp": sdp });
    let outgoing = classifier::outbound_event(
        &serde_json::json!({ "type": "webrtc_signal", "signal": signal }).to_string(),
        "node-1",
        "127.0.0.1".parse().unwrap(),
    );
    let wire = classifier::to_wire(&outgoing, "node-1").to_bytes().unwrap();
    let datagrams = encode_datagrams(&wire, 900, 100).unwrap();
    assert!(datagrams.len() > 1);

    let order: Vec<usize> = (0..datagrams.len()).rev().collect();
    send_all(&tx, node.addr, &datagrams, &order).unwrap();
    let dispositions = node.receive(datagrams.len()).unwrap();
    assert_eq!(dispositions.last(), Some(&Disposition::Posted("webrtc_signal")));
    assert_eq!(posted(&dispositions), 1);

    let v = next_frame_json(frames.recv().await);
    assert_eq!(v["type"], "webrtc_signal");
    assert_eq!(v["from_node"], "node-1");
    assert_eq!(v["signal"], signal);

    shutdown_tx.send(()).unwrap();
    broadcaster.await.unwrap();
}

/// Mixed wire formats classify in the documented order.
#[test]
fn test_wire_formats_classify() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let inputs: [&[u8]; 5] = [
        br#"{"kind":"webrtc_signal","signal":{"type":"ice-candidate"},"from_node":"node-2"}"#,
        br#"{"kind":"call_request","call_type":"audio","caller":"node-3","from_node":"node-3"}"#,
        br#"WEBRTC_SIGNAL:{"type":"answer","sdp":"v=0"}"#,
        b"plain old chat",
        br#"{"kind":"mystery"}"#,
    ];
    for input in inputs {
        tx.send_to(input, node.addr).unwrap();
    }
    assert_eq!(posted(&node.receive(inputs.len()).unwrap()), inputs.len());

    let kinds: Vec<&str> = drain.drain().iter().map(CanonicalEvent::kind).collect();
    assert_eq!(
        kinds,
        vec!["webrtc_signal", "call_request", "webrtc_signal", "chat", "unknown"]
    );
}

/// A node's own broadcast echo is dropped before classification, while a
/// second node on the same host is still heard.
#[test]
fn test_own_broadcast_echo_is_filtered() {
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();
    let (other, _) = loopback_socket().unwrap();

    node.socket().send_to(b"echo of myself", node.addr).unwrap();
    other.send_to(b"hello from next door", node.addr).unwrap();

    assert_eq!(
        node.receive(2).unwrap(),
        vec![Disposition::SelfFiltered, Disposition::Posted("chat")]
    );
    match drain.drain().as_slice() {
        [CanonicalEvent::Chat { text, .. }] => assert_eq!(text, "hello from next door"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(node.pipeline.stats().snapshot().self_filtered, 1);
}
