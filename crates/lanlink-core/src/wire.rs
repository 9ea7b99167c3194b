//! lanlink wire format — what travels inside a UDP datagram.
//!
//! Every datagram is UTF-8 text. Structured datagrams are JSON objects with a
//! `kind` discriminator; anything else is legacy plain text and is left to
//! the classifier. Large payloads are split into `fragment` envelopes whose
//! `payload` field is base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

// ── Protocol constants ───────────────────────────────────────────────────────

/// Largest datagram we send unfragmented. Well under a 1500-byte MTU so the
/// IP layer never has to fragment.
pub const DEFAULT_MAX_SAFE_DATAGRAM: usize = 900;

/// Bytes of each fragment datagram reserved for the JSON envelope.
/// Chunk size = max_safe_datagram - envelope_overhead.
pub const DEFAULT_ENVELOPE_OVERHEAD: usize = 100;

/// Partial messages older than this are discarded by the reassembler.
pub const DEFAULT_FRAGMENT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on `chunk_total` accepted from the network.
pub const DEFAULT_MAX_CHUNK_TOTAL: u32 = 4096;

/// Receive buffer size. A single UDP datagram can never exceed this.
pub const MAX_DATAGRAM: usize = 65_536;

/// Discriminator value of fragment envelopes.
pub const KIND_FRAGMENT: &str = "fragment";

/// Legacy plain-text prefixes.
pub mod legacy {
    pub const CALL_REQUEST: &str = "CALL_REQUEST:";
    pub const WEBRTC_SIGNAL: &str = "WEBRTC_SIGNAL:";
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed fragment envelope: {0}")]
    MalformedFragment(serde_json::Error),
    #[error("invalid fragment geometry: index {index} of {total}")]
    InvalidGeometry { index: u32, total: u32 },
    #[error("fragment declares {total} chunks, limit is {limit}")]
    TooManyChunks { total: u32, limit: u32 },
    #[error("failed to serialize: {0}")]
    SerializeFailed(serde_json::Error),
}

// ── Fragment envelope ─────────────────────────────────────────────────────────

/// One chunk of a payload too large for a single datagram.
///
/// Wire: `{"kind":"fragment","message_id":..,"chunk_index":..,"chunk_total":..,"payload":"<base64>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentEnvelope {
    /// Identifies one logical message across all of its fragments.
    pub message_id: String,
    /// 0-based position of this chunk.
    pub chunk_index: u32,
    /// Number of chunks in the message. Fixed for the life of the message.
    pub chunk_total: u32,
    /// Raw chunk bytes; base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl FragmentEnvelope {
    /// Reject envelopes that can never complete.
    pub fn validate(&self, max_chunk_total: u32) -> Result<(), WireError> {
        if self.chunk_total == 0 || self.chunk_index >= self.chunk_total {
            return Err(WireError::InvalidGeometry {
                index: self.chunk_index,
                total: self.chunk_total,
            });
        }
        if self.chunk_total > max_chunk_total {
            return Err(WireError::TooManyChunks {
                total: self.chunk_total,
                limit: max_chunk_total,
            });
        }
        Ok(())
    }

    /// Serialize as a complete datagram, `kind` field included.
    pub fn to_datagram(&self) -> Result<Vec<u8>, WireError> {
        WireMessage::Fragment(self.clone()).to_bytes()
    }
}

mod base64_bytes {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ── Structured messages ───────────────────────────────────────────────────────

/// Every structured datagram this node emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    Fragment(FragmentEnvelope),
    Chat {
        message: String,
    },
    CallRequest {
        call_type: String,
        caller: String,
        from_node: String,
    },
    #[serde(rename = "webrtc_signal")]
    WebRtcSignal {
        /// SDP offer/answer or ICE candidate. Never inspected here.
        signal: serde_json::Value,
        from_node: String,
    },
}

impl WireMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::SerializeFailed)
    }
}

// ── Inbound datagrams ─────────────────────────────────────────────────────────

/// First-stage view of a received datagram.
#[derive(Debug)]
pub enum Inbound<'a> {
    /// A fragment envelope, bound for the reassembler.
    Fragment(FragmentEnvelope),
    /// A complete payload, bound for the classifier. May be JSON or legacy text.
    Message(&'a [u8]),
}

/// Split fragments from complete payloads.
///
/// Only a JSON object whose `kind` is `fragment` is treated as a fragment;
/// a fragment envelope that fails to decode is an error. Everything else,
/// including non-JSON text, is a complete message.
pub fn decode_datagram(buf: &[u8]) -> Result<Inbound<'_>, WireError> {
    let value: serde_json::Value = match serde_json::from_slice(buf) {
        Ok(v) => v,
        Err(_) => return Ok(Inbound::Message(buf)),
    };

    let is_fragment = value
        .get("kind")
        .and_then(|k| k.as_str())
        .is_some_and(|k| k == KIND_FRAGMENT);
    if !is_fragment {
        return Ok(Inbound::Message(buf));
    }

    // A bad base64 payload surfaces here as a serde data error.
    let envelope: FragmentEnvelope =
        serde_json::from_value(value).map_err(WireError::MalformedFragment)?;
    Ok(Inbound::Fragment(envelope))
}
