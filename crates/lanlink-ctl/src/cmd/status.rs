//! Daemon status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    node_id: String,
    udp_port: u16,
    broadcast_ports: Vec<u16>,
    clients: usize,
    peers: usize,
    transport: TransportCounters,
}

#[derive(Deserialize)]
struct TransportCounters {
    datagrams_received: u64,
    datagrams_sent: u64,
    send_failures: u64,
    self_filtered: u64,
    fragments_accepted: u64,
    fragments_rejected: u64,
    messages_reassembled: u64,
    messages_expired: u64,
    events_posted: u64,
    bridge_post_failures: u64,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    let t = &resp.transport;

    println!("═══════════════════════════════════════");
    println!("  LAN Link Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Node id          : {}", resp.node_id);
    println!("  UDP port         : {}", resp.udp_port);
    println!("  Broadcast ports  : {:?}", resp.broadcast_ports);
    println!("  Live clients     : {}", resp.clients);
    println!("  Registered peers : {}", resp.peers);
    println!();
    println!("  Datagrams in/out : {} / {}", t.datagrams_received, t.datagrams_sent);
    println!("  Send failures    : {}", t.send_failures);
    println!("  Self-filtered    : {}", t.self_filtered);
    println!(
        "  Fragments        : {} accepted, {} rejected",
        t.fragments_accepted, t.fragments_rejected
    );
    println!(
        "  Reassembled      : {} ({} expired)",
        t.messages_reassembled, t.messages_expired
    );
    println!(
        "  Events posted    : {} ({} dropped)",
        t.events_posted, t.bridge_post_failures
    );

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
