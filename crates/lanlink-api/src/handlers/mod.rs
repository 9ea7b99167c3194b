//! HTTP API handlers — exposes daemon state as JSON and accepts outbound
//! signals.

pub mod messages;
pub mod peers;
pub mod status;

use std::sync::Arc;

use lanlink_services::{BroadcasterHandle, OutboundTx, PeerRegistry, TransportStats};

#[derive(Clone)]
pub struct ApiState {
    pub node_id: String,
    pub udp_port: u16,
    pub broadcast_ports: Vec<u16>,
    /// Front door to the broadcaster task that owns live connections.
    pub clients: BroadcasterHandle,
    /// Outbound queue capacity for each new live connection.
    pub queue_depth: usize,
    pub peers: PeerRegistry,
    pub stats: Arc<TransportStats>,
    pub outbound: OutboundTx,
    /// Shutdown broadcast sender — signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// Re-export handler functions for use in router setup.
pub use messages::{handle_call_request, handle_send_message};
pub use peers::{handle_peers, handle_register_peer};
pub use status::{handle_shutdown, handle_status};
