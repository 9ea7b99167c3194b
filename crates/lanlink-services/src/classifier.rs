//! Signal classification — payload bytes in, exactly one [`CanonicalEvent`] out.
//!
//! Classification is an ordered chain, first match wins:
//!
//! 1. JSON object with `kind` (or `type`) `webrtc_signal` → `WebRtcSignal`
//! 2. JSON object with `kind` (or `type`) `call_request` → `CallRequest`
//! 3. not JSON, but a legacy `WEBRTC_SIGNAL:` / `CALL_REQUEST:` prefix → parsed positionally
//! 4. JSON object with a `message` field → `Chat`; other JSON → `Unknown`;
//!    plain text → `Chat`
//!
//! Nothing here returns an error. Malformed input of a recognized shape
//! degrades to `Unknown` with the raw text preserved.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use lanlink_core::wire::legacy;
use lanlink_core::{CanonicalEvent, WireMessage};

const KIND_WEBRTC_SIGNAL: &str = "webrtc_signal";
const KIND_CALL_REQUEST: &str = "call_request";

/// Classify with the current time as the observation timestamp.
pub fn classify(payload: &[u8], sender_ip: IpAddr) -> CanonicalEvent {
    classify_at(payload, sender_ip, Utc::now())
}

pub fn classify_at(payload: &[u8], sender_ip: IpAddr, timestamp: DateTime<Utc>) -> CanonicalEvent {
    let text = String::from_utf8_lossy(payload);

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(obj)) => classify_structured(obj, &text, sender_ip, timestamp),
        _ => classify_text(&text, sender_ip, timestamp),
    }
}

fn discriminator(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("kind")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
}

/// Node ids arrive as strings or bare numbers.
fn node_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn unknown(raw: &str, sender_ip: IpAddr, timestamp: DateTime<Utc>) -> CanonicalEvent {
    CanonicalEvent::Unknown {
        raw_text: raw.to_string(),
        sender_ip,
        timestamp,
    }
}

fn classify_structured(
    mut obj: Map<String, Value>,
    raw: &str,
    sender_ip: IpAddr,
    timestamp: DateTime<Utc>,
) -> CanonicalEvent {
    let kind = discriminator(&obj).map(str::to_owned);
    match kind.as_deref() {
        Some(KIND_WEBRTC_SIGNAL) => {
            let from_node = node_id(obj.get("from_node"));
            match obj.remove("signal") {
                Some(signal) if !signal.is_null() => CanonicalEvent::WebRtcSignal {
                    signal,
                    from_node,
                    sender_ip,
                    timestamp,
                },
                _ => unknown(raw, sender_ip, timestamp),
            }
        }
        Some(KIND_CALL_REQUEST) => {
            let Some(call_type) = str_field(&obj, "call_type") else {
                return unknown(raw, sender_ip, timestamp);
            };
            let from_node = node_id(obj.get("from_node"));
            let caller = str_field(&obj, "caller")
                .map(str::to_string)
                .or_else(|| from_node.clone())
                .unwrap_or_else(|| sender_ip.to_string());
            CanonicalEvent::CallRequest {
                call_type: call_type.to_string(),
                caller,
                from_node,
                source_ip: sender_ip,
                timestamp,
            }
        }
        _ => match str_field(&obj, "message") {
            Some(message) => CanonicalEvent::Chat {
                text: message.to_string(),
                sender_ip,
                timestamp,
            },
            None => unknown(raw, sender_ip, timestamp),
        },
    }
}

fn classify_text(text: &str, sender_ip: IpAddr, timestamp: DateTime<Utc>) -> CanonicalEvent {
    let trimmed = text.trim();

    if let Some(body) = trimmed.strip_prefix(legacy::WEBRTC_SIGNAL) {
        return match serde_json::from_str::<Value>(body) {
            // `WEBRTC_SIGNAL:{"signal":{..},"from_node":..}` or a bare signal body
            Ok(Value::Object(mut obj)) if obj.contains_key("signal") => {
                let from_node = node_id(obj.get("from_node"));
                let signal = obj.remove("signal").unwrap_or(Value::Null);
                CanonicalEvent::WebRtcSignal {
                    signal,
                    from_node,
                    sender_ip,
                    timestamp,
                }
            }
            Ok(signal) => CanonicalEvent::WebRtcSignal {
                signal,
                from_node: None,
                sender_ip,
                timestamp,
            },
            Err(_) => unknown(text, sender_ip, timestamp),
        };
    }

    if let Some(rest) = trimmed.strip_prefix(legacy::CALL_REQUEST) {
        // CALL_REQUEST:<caller>:<call_type>
        return match rest.split_once(':') {
            Some((caller, call_type)) if !caller.trim().is_empty() && !call_type.trim().is_empty() => {
                CanonicalEvent::CallRequest {
                    call_type: call_type.trim().to_string(),
                    caller: caller.trim().to_string(),
                    from_node: None,
                    source_ip: sender_ip,
                    timestamp,
                }
            }
            _ => unknown(text, sender_ip, timestamp),
        };
    }

    CanonicalEvent::Chat {
        text: text.to_string(),
        sender_ip,
        timestamp,
    }
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Interpret text typed by a local client as an event originating here.
///
/// Clients send either JSON (`{"type":"webrtc_signal","signal":..}`,
/// `{"type":"call_request","call_type":..}`, `{"type":"chat","message":..}`)
/// or plain chat text.
pub fn outbound_event(text: &str, node_id: &str, local_ip: IpAddr) -> CanonicalEvent {
    let timestamp = Utc::now();
    match classify_at(text.as_bytes(), local_ip, timestamp) {
        CanonicalEvent::WebRtcSignal {
            signal, sender_ip, ..
        } => CanonicalEvent::WebRtcSignal {
            signal,
            from_node: Some(node_id.to_string()),
            sender_ip,
            timestamp,
        },
        CanonicalEvent::CallRequest {
            call_type,
            caller,
            from_node,
            source_ip,
            ..
        } => {
            // A caller defaulted from the local address means the client left it out.
            let caller = if from_node.is_none() && caller == local_ip.to_string() {
                node_id.to_string()
            } else {
                caller
            };
            CanonicalEvent::CallRequest {
                call_type,
                caller,
                from_node: Some(node_id.to_string()),
                source_ip,
                timestamp,
            }
        }
        // Whatever the client typed is still worth relaying as chat.
        CanonicalEvent::Unknown { raw_text, .. } => CanonicalEvent::Chat {
            text: raw_text,
            sender_ip: local_ip,
            timestamp,
        },
        chat @ CanonicalEvent::Chat { .. } => chat,
    }
}

/// Structured wire form of an event this node is about to send.
pub fn to_wire(event: &CanonicalEvent, node_id: &str) -> WireMessage {
    match event {
        CanonicalEvent::Chat { text, .. } => WireMessage::Chat {
            message: text.clone(),
        },
        CanonicalEvent::CallRequest {
            call_type,
            caller,
            from_node,
            ..
        } => WireMessage::CallRequest {
            call_type: call_type.clone(),
            caller: caller.clone(),
            from_node: from_node.clone().unwrap_or_else(|| node_id.to_string()),
        },
        CanonicalEvent::WebRtcSignal {
            signal, from_node, ..
        } => WireMessage::WebRtcSignal {
            signal: signal.clone(),
            from_node: from_node.clone().unwrap_or_else(|| node_id.to_string()),
        },
        CanonicalEvent::Unknown { raw_text, .. } => WireMessage::Chat {
            message: raw_text.clone(),
        },
    }
}

/// Build a chat message for sending.
pub fn chat(message: impl Into<String>) -> WireMessage {
    WireMessage::Chat {
        message: message.into(),
    }
}

/// Build a call request for sending.
pub fn call_request(call_type: impl Into<String>, node_id: &str) -> WireMessage {
    WireMessage::CallRequest {
        call_type: call_type.into(),
        caller: node_id.to_string(),
        from_node: node_id.to_string(),
    }
}
