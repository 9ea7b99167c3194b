//! /peers handlers — explicit node registration.

use std::net::IpAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lanlink_services::PeerNode;

use super::ApiState;

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerNode>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: state.peers.list(),
    })
}

#[derive(Deserialize)]
pub struct RegisterPeerRequest {
    pub id: String,
    pub ip: IpAddr,
    pub port: u16,
}

pub async fn handle_register_peer(
    State(state): State<ApiState>,
    Json(req): Json<RegisterPeerRequest>,
) -> Result<Json<PeerNode>, (StatusCode, String)> {
    let id = req.id.trim();
    if id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "id must not be empty".to_string()));
    }
    if req.port == 0 {
        return Err((StatusCode::BAD_REQUEST, "port must be non-zero".to_string()));
    }

    if state.peers.register(id, req.ip, req.port) {
        tracing::info!(peer = %id, ip = %req.ip, port = req.port, "peer registered via API");
        state.clients.notice(format!("peer {id} registered"));
    }

    state
        .peers
        .get(id)
        .map(Json)
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "peer vanished".to_string()))
}
