//! Fragment reassembly — turns out-of-order, duplicated, possibly incomplete
//! fragment streams back into whole payloads.
//!
//! The store is owned by the transport's receive loop and never shared, so
//! there is no locking here. Memory is bounded two ways: partial messages
//! older than the fragment timeout are swept, and the number of partial
//! messages held at once is capped.
//!
//! Ids of completed messages are remembered for one fragment timeout so a
//! replayed or duplicated fragment can never rebuild the same payload.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lanlink_core::config::TransportConfig;
use lanlink_core::FragmentEnvelope;

/// Reassembly state for one `message_id`.
struct PendingMessage {
    /// chunk_index -> payload. Keys are always < chunk_total.
    chunks: HashMap<u32, Vec<u8>>,
    chunk_total: u32,
    created_at: Instant,
}

impl PendingMessage {
    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > timeout
    }

    /// Concatenate chunks 0..chunk_total in index order.
    fn into_payload(mut self) -> Vec<u8> {
        let size = self.chunks.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(size);
        for index in 0..self.chunk_total {
            if let Some(chunk) = self.chunks.remove(&index) {
                payload.extend_from_slice(&chunk);
            }
        }
        payload
    }
}

/// Counters describing what the reassembler has done since startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub fragments_accepted: u64,
    pub fragments_rejected: u64,
    pub messages_completed: u64,
    pub messages_expired: u64,
}

pub struct Reassembler {
    pending: HashMap<String, PendingMessage>,
    /// message_id -> completion time. Aged out by `sweep`.
    completed: HashMap<String, Instant>,
    timeout: Duration,
    max_chunk_total: u32,
    max_pending: usize,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new(timeout: Duration, max_chunk_total: u32, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            completed: HashMap::new(),
            timeout,
            max_chunk_total,
            max_pending,
            stats: ReassemblyStats::default(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            config.fragment_timeout(),
            config.max_chunk_total,
            config.max_pending_messages,
        )
    }

    /// Feed one fragment. Returns the whole payload the instant the last
    /// missing chunk arrives, and `None` otherwise.
    ///
    /// Completion is decided by chunk count, so the final index may arrive
    /// first. Re-delivered chunks overwrite in place and never count twice.
    /// Fragments of a message that already completed are dropped.
    pub fn accept(&mut self, fragment: FragmentEnvelope, now: Instant) -> Option<Vec<u8>> {
        if let Err(e) = fragment.validate(self.max_chunk_total) {
            tracing::warn!(message_id = %fragment.message_id, error = %e, "fragment rejected");
            self.stats.fragments_rejected += 1;
            return None;
        }

        if self.completed.contains_key(&fragment.message_id) {
            tracing::trace!(
                message_id = %fragment.message_id,
                index = fragment.chunk_index,
                "fragment of completed message ignored"
            );
            return None;
        }

        // An expired entry must never complete late; start over instead.
        if self
            .pending
            .get(&fragment.message_id)
            .is_some_and(|p| p.is_expired(now, self.timeout))
        {
            self.pending.remove(&fragment.message_id);
            self.stats.messages_expired += 1;
            tracing::debug!(message_id = %fragment.message_id, "expired partial message replaced");
        }

        if !self.pending.contains_key(&fragment.message_id) {
            if self.pending.len() >= self.max_pending {
                self.sweep(now);
            }
            if self.pending.len() >= self.max_pending {
                tracing::warn!(
                    message_id = %fragment.message_id,
                    pending = self.pending.len(),
                    "reassembly store full, dropping fragment"
                );
                self.stats.fragments_rejected += 1;
                return None;
            }
            self.pending.insert(
                fragment.message_id.clone(),
                PendingMessage {
                    chunks: HashMap::new(),
                    chunk_total: fragment.chunk_total,
                    created_at: now,
                },
            );
        }

        let entry = self.pending.get_mut(&fragment.message_id)?;
        if entry.chunk_total != fragment.chunk_total {
            tracing::warn!(
                message_id = %fragment.message_id,
                expected = entry.chunk_total,
                got = fragment.chunk_total,
                "fragment disagrees on chunk_total, dropping"
            );
            self.stats.fragments_rejected += 1;
            return None;
        }

        entry.chunks.insert(fragment.chunk_index, fragment.payload);
        self.stats.fragments_accepted += 1;

        tracing::trace!(
            message_id = %fragment.message_id,
            index = fragment.chunk_index,
            have = entry.chunks.len(),
            total = entry.chunk_total,
            "fragment stored"
        );

        if entry.chunks.len() < entry.chunk_total as usize {
            return None;
        }

        let complete = self.pending.remove(&fragment.message_id)?;
        self.remember_completed(fragment.message_id.clone(), now);
        self.stats.messages_completed += 1;
        let chunk_total = complete.chunk_total;
        let payload = complete.into_payload();
        tracing::debug!(
            message_id = %fragment.message_id,
            chunks = chunk_total,
            bytes = payload.len(),
            "message reassembled"
        );
        Some(payload)
    }

    /// Drop every partial message older than the fragment timeout,
    /// regardless of how many chunks it holds. Returns how many were dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending.retain(|message_id, pending| {
            let stale = pending.is_expired(now, timeout);
            if stale {
                tracing::debug!(
                    message_id,
                    have = pending.chunks.len(),
                    total = pending.chunk_total,
                    "discarding incomplete message (timed out)"
                );
            }
            !stale
        });
        let removed = before - self.pending.len();
        self.stats.messages_expired += removed as u64;
        self.completed
            .retain(|_, done| now.saturating_duration_since(*done) <= timeout);
        removed
    }

    /// Record a completed id. The record is capped like the pending store;
    /// at the cap, entries past the timeout go first, then the oldest.
    fn remember_completed(&mut self, message_id: String, now: Instant) {
        if self.completed.len() >= self.max_pending {
            let timeout = self.timeout;
            self.completed
                .retain(|_, done| now.saturating_duration_since(*done) <= timeout);
        }
        if self.completed.len() >= self.max_pending {
            let oldest = self
                .completed
                .iter()
                .min_by_key(|(_, done)| **done)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                self.completed.remove(&id);
            }
        }
        self.completed.insert(message_id, now);
    }

    /// Number of partial messages currently held.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.pending.contains_key(message_id)
    }

    /// Chunks received so far for a partial message.
    pub fn received(&self, message_id: &str) -> Option<usize> {
        self.pending.get(message_id).map(|p| p.chunks.len())
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Whether `message_id` completed within the last fragment timeout.
    pub fn recently_completed(&self, message_id: &str) -> bool {
        self.completed.contains_key(message_id)
    }

    /// Discard all partial messages. Called on shutdown.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::split_payload;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn reassembler() -> Reassembler {
        Reassembler::new(TIMEOUT, 4096, 1024)
    }

    fn frag(id: &str, index: u32, total: u32, payload: &[u8]) -> FragmentEnvelope {
        FragmentEnvelope {
            message_id: id.into(),
            chunk_index: index,
            chunk_total: total,
            payload: payload.to_vec(),
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn out_of_order_delivery_reconstructs_payload() {
        let data = sample(2500);
        let fragments = split_payload(&data, 800, "m-2500".into());
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[3].payload.len(), 100);

        let mut r = reassembler();
        let now = Instant::now();
        let mut result = None;
        for i in [3usize, 1, 0, 2] {
            let out = r.accept(fragments[i].clone(), now);
            if i != 2 {
                assert!(out.is_none(), "completed early at chunk {i}");
            }
            result = out;
        }
        assert_eq!(result.unwrap(), data);
        assert!(r.is_empty());
    }

    #[test]
    fn every_permutation_of_three_completes_exactly_once() {
        let data = sample(250);
        let fragments = split_payload(&data, 100, "perm".into());
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let mut r = reassembler();
            let now = Instant::now();
            let outputs: Vec<_> = order
                .iter()
                .filter_map(|&i| r.accept(fragments[i].clone(), now))
                .collect();
            assert_eq!(outputs.len(), 1, "order {order:?}");
            assert_eq!(outputs[0], data);
        }
    }

    #[test]
    fn duplicate_chunk_does_not_count_twice() {
        let mut r = reassembler();
        let now = Instant::now();
        assert!(r.accept(frag("dup", 0, 3, b"aa"), now).is_none());
        assert!(r.accept(frag("dup", 0, 3, b"aa"), now).is_none());
        assert!(r.accept(frag("dup", 1, 3, b"bb"), now).is_none());
        assert!(r.accept(frag("dup", 1, 3, b"bb"), now).is_none());
        assert_eq!(r.received("dup"), Some(2));

        let out = r.accept(frag("dup", 2, 3, b"cc"), now).unwrap();
        assert_eq!(out, b"aabbcc");
    }

    #[test]
    fn replayed_message_completes_only_once() {
        let mut r = reassembler();
        let now = Instant::now();
        let sequence = [(0, b"a"), (1, b"b"), (1, b"b"), (0, b"a")];
        let completions: Vec<_> = sequence
            .iter()
            .filter_map(|&(i, p)| r.accept(frag("once", i, 2, p), now))
            .collect();
        assert_eq!(completions, vec![b"ab".to_vec()]);
        assert!(r.is_empty());
        assert!(!r.contains("once"));
        assert_eq!(r.stats().messages_completed, 1);
    }

    #[test]
    fn whole_message_duplicated_by_the_network_yields_one_payload() {
        let data = sample(2500);
        let fragments = split_payload(&data, 800, "twice".into());
        let mut r = reassembler();
        let now = Instant::now();
        let completions = fragments
            .iter()
            .chain(fragments.iter())
            .filter_map(|f| r.accept(f.clone(), now))
            .count();
        assert_eq!(completions, 1);
        assert!(r.is_empty());
    }

    #[test]
    fn completed_ids_are_forgotten_after_the_timeout() {
        let mut r = reassembler();
        let t0 = Instant::now();
        r.accept(frag("again", 0, 1, b"x"), t0).unwrap();
        assert!(r.recently_completed("again"));

        r.sweep(t0 + Duration::from_secs(29));
        assert!(r.recently_completed("again"));
        r.sweep(t0 + Duration::from_secs(31));
        assert!(!r.recently_completed("again"));

        let out = r.accept(frag("again", 0, 1, b"y"), t0 + Duration::from_secs(32));
        assert_eq!(out.unwrap(), b"y");
    }

    #[test]
    fn completed_record_is_capped() {
        let mut r = Reassembler::new(TIMEOUT, 16, 2);
        let now = Instant::now();
        r.accept(frag("c1", 0, 1, b"1"), now).unwrap();
        r.accept(frag("c2", 0, 1, b"2"), now + Duration::from_secs(1)).unwrap();
        r.accept(frag("c3", 0, 1, b"3"), now + Duration::from_secs(2)).unwrap();
        assert!(!r.recently_completed("c1"));
        assert!(r.recently_completed("c2"));
        assert!(r.recently_completed("c3"));
    }

    #[test]
    fn sweep_purges_stale_partial_message() {
        let mut r = reassembler();
        let t0 = Instant::now();
        r.accept(frag("stale", 0, 3, b"x"), t0);
        r.accept(frag("stale", 1, 3, b"y"), t0);

        assert_eq!(r.sweep(t0 + Duration::from_secs(29)), 0);
        assert!(r.contains("stale"));

        assert_eq!(r.sweep(t0 + Duration::from_secs(31)), 1);
        assert!(!r.contains("stale"));
        assert_eq!(r.stats().messages_expired, 1);
    }

    #[test]
    fn completion_before_timeout_is_not_a_sweep() {
        let mut r = reassembler();
        let t0 = Instant::now();
        r.accept(frag("fast", 0, 3, b"x"), t0);
        r.accept(frag("fast", 1, 3, b"y"), t0);
        let out = r.accept(frag("fast", 2, 3, b"z"), t0 + Duration::from_secs(5));
        assert_eq!(out.unwrap(), b"xyz");

        assert_eq!(r.sweep(t0 + Duration::from_secs(31)), 0);
        let stats = r.stats();
        assert_eq!(stats.messages_completed, 1);
        assert_eq!(stats.messages_expired, 0);
    }

    #[test]
    fn expired_entry_never_completes_late() {
        let mut r = reassembler();
        let t0 = Instant::now();
        r.accept(frag("late", 0, 2, b"a"), t0);
        // Last chunk arrives after the timeout but before any sweep ran.
        let out = r.accept(frag("late", 1, 2, b"b"), t0 + Duration::from_secs(31));
        assert!(out.is_none());
        assert_eq!(r.received("late"), Some(1));
    }

    #[test]
    fn single_chunk_message_completes_immediately() {
        let mut r = reassembler();
        let out = r.accept(frag("solo", 0, 1, b"whole"), Instant::now());
        assert_eq!(out.unwrap(), b"whole");
        assert!(r.is_empty());
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let mut r = reassembler();
        let now = Instant::now();
        assert!(r.accept(frag("bad", 3, 3, b"x"), now).is_none());
        assert!(r.accept(frag("bad", 0, 0, b"x"), now).is_none());
        assert!(r.accept(frag("bad", 0, 5000, b"x"), now).is_none());
        assert!(r.is_empty());
        assert_eq!(r.stats().fragments_rejected, 3);
    }

    #[test]
    fn mismatched_total_is_dropped() {
        let mut r = reassembler();
        let now = Instant::now();
        r.accept(frag("mix", 0, 3, b"a"), now);
        assert!(r.accept(frag("mix", 1, 2, b"b"), now).is_none());
        assert_eq!(r.received("mix"), Some(1));
    }

    #[test]
    fn full_store_drops_new_messages_but_keeps_existing() {
        let mut r = Reassembler::new(TIMEOUT, 16, 2);
        let now = Instant::now();
        r.accept(frag("a", 0, 2, b"1"), now);
        r.accept(frag("b", 0, 2, b"1"), now);
        assert!(r.accept(frag("c", 0, 2, b"1"), now).is_none());
        assert!(!r.contains("c"));

        // Existing entries still complete.
        assert!(r.accept(frag("a", 1, 2, b"2"), now).is_some());
        r.accept(frag("e", 0, 2, b"1"), now);
        assert_eq!(r.len(), 2);

        // Once the old entries are stale, room is made by sweeping.
        let later = now + Duration::from_secs(31);
        r.accept(frag("d", 0, 2, b"1"), later);
        assert!(r.contains("d"));
        assert!(!r.contains("b"));
    }

    #[test]
    fn independent_messages_interleave() {
        let mut r = reassembler();
        let now = Instant::now();
        r.accept(frag("x", 1, 2, b"X2"), now);
        r.accept(frag("y", 0, 2, b"Y1"), now);
        assert_eq!(r.accept(frag("y", 1, 2, b"Y2"), now).unwrap(), b"Y1Y2");
        assert_eq!(r.accept(frag("x", 0, 2, b"X1"), now).unwrap(), b"X1X2");
    }
}
