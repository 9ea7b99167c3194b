//! Peer listing and registration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    id: String,
    ip: String,
    port: u16,
    status: String,
    last_seen: String,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    id: &'a str,
    ip: &'a str,
    port: u16,
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers registered.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Registered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.id);
        println!("  │  addr      : {}:{}", p.ip, p.port);
        println!("  │  status    : {}", p.status);
        println!("  └─ last seen : {}", p.last_seen);
    }

    Ok(())
}

pub async fn cmd_peer_add(port: u16, id: &str, ip: &str, peer_port: &str) -> Result<()> {
    let peer_port: u16 = peer_port.parse().context("peer port must be a number")?;
    let body = RegisterRequest {
        id,
        ip,
        port: peer_port,
    };
    let peer: PeerInfo = post_json_body(&format!("{}/peers", base_url(port)), &body).await?;
    println!("Registered {} at {}:{} ({})", peer.id, peer.ip, peer.port, peer.status);
    Ok(())
}
