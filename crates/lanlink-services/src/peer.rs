//! Peer registry — nodes that announced themselves over the API.
//!
//! Registration is explicit (`POST /api/peers`); nothing here is learned from
//! UDP traffic. Entries are never removed, only marked stale when they have
//! not been refreshed within the TTL.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// How long a registration stays `online` without a refresh.
pub const PEER_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Online,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerNode {
    pub id: String,
    pub ip: IpAddr,
    pub port: u16,
    pub status: PeerStatus,
    pub last_seen: DateTime<Utc>,
}

/// Shared between the API handlers and the expiry task. Keyed on node id.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<String, PeerNode>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer. Returns `true` if the id was not known yet.
    pub fn register(&self, id: impl Into<String>, ip: IpAddr, port: u16) -> bool {
        self.register_at(id, ip, port, Utc::now())
    }

    pub fn register_at(&self, id: impl Into<String>, ip: IpAddr, port: u16, now: DateTime<Utc>) -> bool {
        let id = id.into();
        let node = PeerNode {
            id: id.clone(),
            ip,
            port,
            status: PeerStatus::Online,
            last_seen: now,
        };
        let is_new = self.peers.insert(id.clone(), node).is_none();
        tracing::debug!(peer = %id, %ip, port, is_new, "peer registered");
        is_new
    }

    pub fn get(&self, id: &str) -> Option<PeerNode> {
        self.peers.get(id).map(|p| p.clone())
    }

    /// Snapshot of every known peer, sorted by id.
    pub fn list(&self) -> Vec<PeerNode> {
        let mut peers: Vec<PeerNode> = self.peers.iter().map(|p| p.value().clone()).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Mark every online peer last seen more than `ttl` before `now` as
    /// stale. Returns the ids that changed.
    pub fn mark_stale(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<String> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut changed = Vec::new();
        for mut entry in self.peers.iter_mut() {
            let peer = entry.value_mut();
            if peer.status == PeerStatus::Online && now - peer.last_seen > ttl {
                peer.status = PeerStatus::Stale;
                changed.push(peer.id.clone());
            }
        }
        changed
    }
}

/// Periodically mark peers stale. Runs until shutdown.
pub async fn expiry_loop(
    registry: PeerRegistry,
    ttl: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for id in registry.mark_stale(ttl, Utc::now()) {
                    tracing::info!(peer = %id, "peer marked stale");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
