//! Receive loop — runs on its own OS thread with a blocking socket.
//!
//! Per datagram: drop our own traffic, route fragments through the
//! reassembler, classify whole payloads and post the resulting event to the
//! bridge. The socket read timeout bounds how long a cleared running flag
//! goes unnoticed.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lanlink_core::wire::{decode_datagram, Inbound, MAX_DATAGRAM};
use lanlink_services::{classifier, EventPoster, Reassembler, TransportStats};

use super::local::SelfFilter;

/// How often partial messages are checked against the fragment timeout.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    SelfFiltered,
    /// A fragment was stored; the message is not complete yet.
    Partial,
    /// An event of this kind was posted to the bridge.
    Posted(&'static str),
    /// The event was classified but the bridge is closed.
    BridgeClosed,
}

pub struct ReceiveLoop {
    socket: UdpSocket,
    reassembler: Reassembler,
    poster: EventPoster,
    filter: SelfFilter,
    stats: Arc<TransportStats>,
    running: Arc<AtomicBool>,
}

impl ReceiveLoop {
    pub fn new(
        socket: UdpSocket,
        reassembler: Reassembler,
        poster: EventPoster,
        filter: SelfFilter,
        stats: Arc<TransportStats>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            socket,
            reassembler,
            poster,
            filter,
            stats,
            running,
        }
    }

    /// Block until the running flag is cleared.
    pub fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut last_sweep = Instant::now();

        tracing::info!(
            local_ip = %self.filter.local_ip(),
            port = self.filter.port(),
            "receive loop starting"
        );

        while self.running.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    self.handle_datagram(&buf[..len], from, Instant::now());
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                }
            }

            let now = Instant::now();
            if now.duration_since(last_sweep) >= SWEEP_INTERVAL {
                self.sweep(now);
                last_sweep = now;
            }
        }

        let discarded = self.reassembler.len();
        self.reassembler.clear();
        tracing::info!(discarded, "receive loop stopped");
    }

    /// Discard partial messages past the fragment timeout.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired = self.reassembler.sweep(now);
        if expired > 0 {
            tracing::info!(expired, "discarded incomplete messages");
            self.stats.record_reassembly(self.reassembler.stats());
        }
        expired
    }

    /// Partial messages currently held.
    pub fn pending(&self) -> usize {
        self.reassembler.len()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr, now: Instant) -> Disposition {
        TransportStats::incr(&self.stats.datagrams_received);

        if self.filter.is_self(from) {
            TransportStats::incr(&self.stats.self_filtered);
            tracing::trace!(%from, "ignoring own datagram");
            return Disposition::SelfFiltered;
        }

        tracing::trace!(%from, bytes = datagram.len(), "datagram received");

        let event = match decode_datagram(datagram) {
            Ok(Inbound::Fragment(fragment)) => {
                let completed = self.reassembler.accept(fragment, now);
                self.stats.record_reassembly(self.reassembler.stats());
                match completed {
                    Some(payload) => classifier::classify(&payload, from.ip()),
                    None => return Disposition::Partial,
                }
            }
            Ok(Inbound::Message(payload)) => classifier::classify(payload, from.ip()),
            Err(e) => {
                tracing::warn!(%from, error = %e, "malformed fragment, classifying as text");
                classifier::classify(datagram, from.ip())
            }
        };

        let kind = event.kind();
        match self.poster.post(event) {
            Ok(()) => {
                TransportStats::incr(&self.stats.events_posted);
                tracing::debug!(%from, kind, "event posted");
                Disposition::Posted(kind)
            }
            Err(e) => {
                TransportStats::incr(&self.stats.bridge_post_failures);
                tracing::warn!(%from, error = %e, "event dropped");
                Disposition::BridgeClosed
            }
        }
    }
}
