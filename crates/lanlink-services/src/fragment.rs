//! Outbound fragmentation — split oversized payloads into fragment envelopes.

use lanlink_core::{FragmentEnvelope, WireError};

/// Fresh message id: hex of the first 16 bytes of
/// `blake3(random_nonce || payload)`.
///
/// 128 bits with a random nonce, so two nodes sending the same payload at
/// the same moment still get different ids.
pub fn new_message_id(payload: &[u8]) -> String {
    let nonce: [u8; 16] = rand::random();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&nonce);
    hasher.update(payload);
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

/// Split `payload` into `chunk_size`-byte fragments tagged with `message_id`.
/// The last fragment carries the remainder.
pub fn split_payload(payload: &[u8], chunk_size: usize, message_id: String) -> Vec<FragmentEnvelope> {
    let chunk_size = chunk_size.max(1);
    let chunk_total = payload.len().div_ceil(chunk_size).max(1) as u32;

    if payload.is_empty() {
        return vec![FragmentEnvelope {
            message_id,
            chunk_index: 0,
            chunk_total,
            payload: Vec::new(),
        }];
    }

    payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| FragmentEnvelope {
            message_id: message_id.clone(),
            chunk_index: index as u32,
            chunk_total,
            payload: chunk.to_vec(),
        })
        .collect()
}

/// Turn one logical payload into the datagrams that carry it.
///
/// Payloads up to `max_safe_datagram` bytes go out untouched as a single
/// datagram. Larger payloads become fragment envelopes of
/// `max_safe_datagram - envelope_overhead` payload bytes each, in index order.
pub fn encode_datagrams(
    payload: &[u8],
    max_safe_datagram: usize,
    envelope_overhead: usize,
) -> Result<Vec<Vec<u8>>, WireError> {
    if payload.len() <= max_safe_datagram {
        return Ok(vec![payload.to_vec()]);
    }

    let chunk_size = max_safe_datagram.saturating_sub(envelope_overhead);
    let message_id = new_message_id(payload);
    let fragments = split_payload(payload, chunk_size, message_id);

    tracing::debug!(
        message_id = %fragments[0].message_id,
        bytes = payload.len(),
        chunks = fragments.len(),
        "payload fragmented"
    );

    fragments.iter().map(FragmentEnvelope::to_datagram).collect()
}
