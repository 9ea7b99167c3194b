use crate::*;

use std::time::Instant;

use lanlink_core::CanonicalEvent;
use lanlink_services::bridge;
use lanlink_services::fragment::encode_datagrams;

/// A chat message too large for one datagram arrives out of order and is
/// posted exactly once, byte for byte.
#[test]
fn test_large_chat_reassembled_out_of_order() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let text: String = (0..2300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let payload = serde_json::json!({ "kind": "chat", "message": text }).to_string();
    let datagrams = encode_datagrams(payload.as_bytes(), 900, 100).unwrap();
    assert_eq!(datagrams.len(), 3);

    send_all(&tx, node.addr, &datagrams, &[2, 0, 1]).unwrap();
    let dispositions = node.receive(datagrams.len()).unwrap();
    assert_eq!(
        dispositions,
        vec![Disposition::Partial, Disposition::Partial, Disposition::Posted("chat")]
    );

    let events = drain.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        CanonicalEvent::Chat { text: got, .. } => assert_eq!(got, &text),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(node.pipeline.pending(), 0);
}

/// The reference geometry: 2500 bytes at 900/100 is 3×800 + 1×100, and
/// order 3,1,0,2 reconstructs the original.
#[test]
fn test_reference_geometry_over_udp() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let original: String = "0123456789".repeat(250);
    let datagrams = encode_datagrams(original.as_bytes(), 900, 100).unwrap();
    assert_eq!(datagrams.len(), 4);

    send_all(&tx, node.addr, &datagrams, &[3, 1, 0, 2]).unwrap();
    assert_eq!(posted(&node.receive(4).unwrap()), 1);

    match drain.drain().pop() {
        Some(CanonicalEvent::Chat { text, .. }) => assert_eq!(text, original),
        other => panic!("unexpected {other:?}"),
    }
}

/// The network delivers every fragment twice; clients still see one event.
#[test]
fn test_duplicated_message_posted_once() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let datagrams = encode_datagrams(&[b'd'; 1700], 900, 100).unwrap();
    assert_eq!(datagrams.len(), 3);

    send_all(&tx, node.addr, &datagrams, &[0, 1, 2, 1, 0, 2]).unwrap();
    assert_eq!(posted(&node.receive(6).unwrap()), 1);
    assert_eq!(drain.drain().len(), 1);
    assert_eq!(node.pipeline.pending(), 0);
}

/// Two senders interleave fragments of different messages; both complete.
#[test]
fn test_interleaved_senders() {
    let (tx_a, _) = loopback_socket().unwrap();
    let (tx_b, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let a = encode_datagrams(&[b'A'; 1700], 900, 100).unwrap();
    let b = encode_datagrams(&[b'B'; 1700], 900, 100).unwrap();
    assert_eq!((a.len(), b.len()), (3, 3));

    for i in [0, 2, 1] {
        send_all(&tx_a, node.addr, &a, &[i]).unwrap();
        send_all(&tx_b, node.addr, &b, &[i]).unwrap();
    }
    assert_eq!(posted(&node.receive(6).unwrap()), 2);

    let mut texts: Vec<String> = drain
        .drain()
        .into_iter()
        .map(|e| match e {
            CanonicalEvent::Chat { text, .. } => text,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["A".repeat(1700), "B".repeat(1700)]);
}

/// A message missing one fragment is never posted and is swept once the
/// fragment timeout passes.
#[test]
fn test_incomplete_message_is_swept() {
    let (tx, _) = loopback_socket().unwrap();
    let (poster, mut drain) = bridge::channel();
    let mut node = Node::bind(poster).unwrap();

    let datagrams = encode_datagrams(&[b'z'; 2000], 900, 100).unwrap();
    assert_eq!(datagrams.len(), 3);
    send_all(&tx, node.addr, &datagrams, &[0, 2]).unwrap();

    assert_eq!(posted(&node.receive(2).unwrap()), 0);
    assert_eq!(node.pipeline.pending(), 1);

    let now = Instant::now();
    assert_eq!(node.pipeline.sweep(now + Duration::from_secs(29)), 0);
    assert_eq!(node.pipeline.sweep(now + Duration::from_secs(31)), 1);
    assert_eq!(node.pipeline.pending(), 0);
    assert_eq!(node.pipeline.stats().snapshot().messages_expired, 1);
    assert!(drain.drain().is_empty());
}
