//! Transport counters, shared between the receive thread and the API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::reassembler::ReassemblyStats;

#[derive(Debug, Default)]
pub struct TransportStats {
    pub datagrams_received: AtomicU64,
    pub datagrams_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub self_filtered: AtomicU64,
    pub fragments_accepted: AtomicU64,
    pub fragments_rejected: AtomicU64,
    pub messages_reassembled: AtomicU64,
    pub messages_expired: AtomicU64,
    pub events_posted: AtomicU64,
    pub bridge_post_failures: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub datagrams_sent: u64,
    pub send_failures: u64,
    pub self_filtered: u64,
    pub fragments_accepted: u64,
    pub fragments_rejected: u64,
    pub messages_reassembled: u64,
    pub messages_expired: u64,
    pub events_posted: u64,
    pub bridge_post_failures: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Mirror the reassembler's own counters. The reassembler lives on the
    /// receive thread, so it reports here after each fragment.
    pub fn record_reassembly(&self, r: ReassemblyStats) {
        self.fragments_accepted.store(r.fragments_accepted, Ordering::Relaxed);
        self.fragments_rejected.store(r.fragments_rejected, Ordering::Relaxed);
        self.messages_reassembled.store(r.messages_completed, Ordering::Relaxed);
        self.messages_expired.store(r.messages_expired, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams_received: load(&self.datagrams_received),
            datagrams_sent: load(&self.datagrams_sent),
            send_failures: load(&self.send_failures),
            self_filtered: load(&self.self_filtered),
            fragments_accepted: load(&self.fragments_accepted),
            fragments_rejected: load(&self.fragments_rejected),
            messages_reassembled: load(&self.messages_reassembled),
            messages_expired: load(&self.messages_expired),
            events_posted: load(&self.events_posted),
            bridge_post_failures: load(&self.bridge_post_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = TransportStats::new();
        TransportStats::incr(&stats.datagrams_received);
        TransportStats::incr(&stats.datagrams_received);
        TransportStats::add(&stats.datagrams_sent, 4);
        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.datagrams_sent, 4);
        assert_eq!(snap.self_filtered, 0);
        assert_eq!(serde_json::to_value(snap).unwrap()["datagrams_sent"], 4);
    }

    #[test]
    fn reassembly_counters_are_mirrored() {
        let stats = TransportStats::new();
        stats.record_reassembly(ReassemblyStats {
            fragments_accepted: 4,
            fragments_rejected: 1,
            messages_completed: 1,
            messages_expired: 2,
        });
        let snap = stats.snapshot();
        assert_eq!(snap.fragments_accepted, 4);
        assert_eq!(snap.messages_reassembled, 1);
        assert_eq!(snap.messages_expired, 2);
    }
}
