//! lanlink-services — the signaling pipeline between socket and live clients.
//!
//! Inbound: fragment → [`Reassembler`] → [`classifier`] → [`bridge`] → [`Broadcaster`].
//! Outbound: client text → [`classifier::outbound_event`] → [`fragment::encode_datagrams`].

pub mod bridge;
pub mod broadcaster;
pub mod classifier;
pub mod fragment;
pub mod outbound;
pub mod peer;
pub mod reassembler;
pub mod stats;

pub use bridge::{BridgeClosed, EventDrain, EventPoster};
pub use broadcaster::{
    Broadcaster, BroadcasterHandle, BroadcasterTask, ClientSink, ConnectionId, DeliveryError,
    FanoutReport, QueueSink,
};
pub use outbound::{OutboundRx, OutboundSignal, OutboundTx};
pub use peer::{PeerNode, PeerRegistry, PeerStatus, PEER_TTL};
pub use reassembler::{Reassembler, ReassemblyStats};
pub use stats::{StatsSnapshot, TransportStats};
