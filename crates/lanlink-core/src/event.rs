//! Canonical events — the normalized form of every inbound signal.
//!
//! The serde representation of these types IS the client-facing envelope:
//! `{"type": "...", ...fields, "timestamp": "<RFC 3339>"}`. Timestamps are
//! assigned when the event is observed on this node, never taken from the
//! sender; no clock synchronization between nodes is assumed.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A classified inbound signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    /// Free-form chat text.
    Chat {
        text: String,
        sender_ip: IpAddr,
        timestamp: DateTime<Utc>,
    },
    /// A peer asking to start an audio or video call.
    CallRequest {
        call_type: String,
        caller: String,
        /// Absent for legacy `CALL_REQUEST:` datagrams.
        from_node: Option<String>,
        source_ip: IpAddr,
        timestamp: DateTime<Utc>,
    },
    /// SDP offer/answer or ICE candidate, passed through untouched.
    #[serde(rename = "webrtc_signal")]
    WebRtcSignal {
        signal: serde_json::Value,
        from_node: Option<String>,
        sender_ip: IpAddr,
        timestamp: DateTime<Utc>,
    },
    /// Anything that could not be classified.
    Unknown {
        raw_text: String,
        sender_ip: IpAddr,
        timestamp: DateTime<Utc>,
    },
}

impl CanonicalEvent {
    /// The `type` string clients see.
    pub fn kind(&self) -> &'static str {
        match self {
            CanonicalEvent::Chat { .. } => "chat",
            CanonicalEvent::CallRequest { .. } => "call_request",
            CanonicalEvent::WebRtcSignal { .. } => "webrtc_signal",
            CanonicalEvent::Unknown { .. } => "unknown",
        }
    }

    /// Address of the node the datagram came from.
    pub fn sender_ip(&self) -> IpAddr {
        match self {
            CanonicalEvent::Chat { sender_ip, .. }
            | CanonicalEvent::WebRtcSignal { sender_ip, .. }
            | CanonicalEvent::Unknown { sender_ip, .. } => *sender_ip,
            CanonicalEvent::CallRequest { source_ip, .. } => *source_ip,
        }
    }

    /// When this node classified the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CanonicalEvent::Chat { timestamp, .. }
            | CanonicalEvent::CallRequest { timestamp, .. }
            | CanonicalEvent::WebRtcSignal { timestamp, .. }
            | CanonicalEvent::Unknown { timestamp, .. } => *timestamp,
        }
    }
}

/// A locally generated notice, e.g. "peer node-2 registered".
///
/// Wire: `{"type":"system","message":..,"timestamp":..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "system")]
pub struct SystemNotice {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SystemNotice {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
