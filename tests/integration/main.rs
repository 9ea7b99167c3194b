//! lanlink integration test harness.
//!
//! Tests here run the signaling pipeline end to end over real loopback UDP
//! sockets: fragment and send on one socket, then hand each received datagram
//! to the daemon's own `ReceiveLoop` for self-filtering, reassembly,
//! classification and posting to the bridge. No root or special network
//! setup is needed.
//!
//!   cargo test --test integration

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use lanlink_core::wire::MAX_DATAGRAM;
use lanlink_services::{EventPoster, Reassembler, TransportStats};
use lanlinkd::transport::receive::Disposition;
use lanlinkd::transport::{ReceiveLoop, SelfFilter};

mod fanout;
mod fragmentation;
mod signaling;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Bind a UDP socket on 127.0.0.1 with an OS-assigned port.
pub fn loopback_socket() -> Result<(UdpSocket, SocketAddr)> {
    let socket = UdpSocket::bind("127.0.0.1:0").context("bind loopback socket")?;
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    let addr = socket.local_addr()?;
    Ok((socket, addr))
}

/// Send each datagram, in the given order, from `from` to `to`.
pub fn send_all(from: &UdpSocket, to: SocketAddr, datagrams: &[Vec<u8>], order: &[usize]) -> Result<()> {
    for &i in order {
        from.send_to(&datagrams[i], to)
            .with_context(|| format!("send datagram {i}"))?;
    }
    Ok(())
}

/// A receiving node: a loopback socket plus the daemon's receive pipeline.
///
/// The pipeline is driven one datagram at a time on the test thread rather
/// than from its own thread, so every `Disposition` can be asserted on.
pub struct Node {
    socket: UdpSocket,
    pub addr: SocketAddr,
    pub pipeline: ReceiveLoop,
}

impl Node {
    pub fn bind(poster: EventPoster) -> Result<Self> {
        let (socket, addr) = loopback_socket()?;
        let pipeline = ReceiveLoop::new(
            socket.try_clone().context("clone receive socket")?,
            Reassembler::new(Duration::from_secs(30), 4096, 64),
            poster,
            SelfFilter::new(addr.ip(), addr.port()),
            Arc::new(TransportStats::new()),
            Arc::new(AtomicBool::new(true)),
        );
        Ok(Self { socket, addr, pipeline })
    }

    /// The node's own socket, for sending datagrams that should loop back
    /// to itself.
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    /// Read exactly `count` datagrams and run each through the pipeline.
    pub fn receive(&mut self, count: usize) -> Result<Vec<Disposition>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .with_context(|| format!("recv_from timed out waiting for datagram {i}"))?;
            out.push(self.pipeline.handle_datagram(&buf[..len], from, Instant::now()));
        }
        Ok(out)
    }
}

/// Number of events that reached the bridge.
pub fn posted(dispositions: &[Disposition]) -> usize {
    dispositions
        .iter()
        .filter(|d| matches!(d, Disposition::Posted(_)))
        .count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// Two loopback sockets can exchange datagrams. Everything else builds on this.
#[test]
fn test_loopback_roundtrip() {
    let (a, _) = loopback_socket().unwrap();
    let (b, addr_b) = loopback_socket().unwrap();

    a.send_to(b"ping", addr_b).unwrap();
    let mut buf = [0u8; 16];
    let (n, from) = b.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(from, a.local_addr().unwrap());
}
