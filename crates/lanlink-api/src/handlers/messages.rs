//! /messages/send and /calls/request — outbound signals without a live
//! connection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lanlink_services::{classifier, OutboundSignal};

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: bool,
    pub targets: Vec<u16>,
}

fn enqueue(state: &ApiState, signal: OutboundSignal) -> Result<Json<QueuedResponse>, (StatusCode, String)> {
    state.outbound.send(signal).map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "sender is shutting down".to_string(),
        )
    })?;
    Ok(Json(QueuedResponse {
        queued: true,
        targets: state.broadcast_ports.clone(),
    }))
}

// ── /messages/send (POST) ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

pub async fn handle_send_message(
    State(state): State<ApiState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<QueuedResponse>, (StatusCode, String)> {
    if req.text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text must not be empty".to_string()));
    }
    enqueue(&state, OutboundSignal::Message(classifier::chat(req.text)))
}

// ── /calls/request (POST) ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CallRequest {
    pub call_type: String,
}

pub async fn handle_call_request(
    State(state): State<ApiState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<QueuedResponse>, (StatusCode, String)> {
    match req.call_type.as_str() {
        "audio" | "video" => {}
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("call_type must be audio or video, got {other:?}"),
            ))
        }
    }
    tracing::info!(call_type = %req.call_type, "call request via API");
    enqueue(
        &state,
        OutboundSignal::Message(classifier::call_request(req.call_type, &state.node_id)),
    )
}
