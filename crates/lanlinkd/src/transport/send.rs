//! Outbound datagrams — fragment if needed, then fan out to every target port.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use lanlink_core::config::LanlinkConfig;
use lanlink_core::{WireError, WireMessage};
use lanlink_services::fragment::encode_datagrams;
use lanlink_services::{classifier, TransportStats};

/// Result of sending one payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams written to the socket, across all targets.
    pub datagrams: usize,
    /// Ports where at least one datagram could not be sent.
    pub failed_ports: Vec<u16>,
}

/// Shares the receive socket so outbound traffic carries our receive port
/// as its source port, which is what [`super::SelfFilter`] keys on.
#[derive(Clone)]
pub struct OutboundSender {
    socket: Arc<UdpSocket>,
    dest_ip: IpAddr,
    ports: Arc<[u16]>,
    max_safe_datagram: usize,
    envelope_overhead: usize,
    node_id: Arc<str>,
    local_ip: IpAddr,
    stats: Arc<TransportStats>,
}

impl OutboundSender {
    pub fn new(
        socket: UdpSocket,
        config: &LanlinkConfig,
        local_ip: IpAddr,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            dest_ip: config.network.broadcast_addr,
            ports: config.network.broadcast_ports.clone().into(),
            max_safe_datagram: config.transport.max_safe_datagram,
            envelope_overhead: config.transport.envelope_overhead,
            node_id: config.node.id.as_str().into(),
            local_ip,
            stats,
        }
    }

    /// Send `payload` to every configured port.
    pub fn send(&self, payload: &[u8]) -> Result<SendReport, WireError> {
        let ports = self.ports.clone();
        self.send_to_ports(payload, &ports)
    }

    /// Send `payload` to each of `ports` on the destination address.
    ///
    /// Oversized payloads are split into fragments and every fragment goes to
    /// every port in index order. A failing port does not stop delivery to
    /// the others.
    pub fn send_to_ports(&self, payload: &[u8], ports: &[u16]) -> Result<SendReport, WireError> {
        let datagrams = encode_datagrams(payload, self.max_safe_datagram, self.envelope_overhead)?;
        let mut report = SendReport::default();

        for &port in ports {
            let dest = SocketAddr::new(self.dest_ip, port);
            for datagram in &datagrams {
                match self.socket.send_to(datagram, dest) {
                    Ok(_) => {
                        report.datagrams += 1;
                        TransportStats::incr(&self.stats.datagrams_sent);
                    }
                    Err(e) => {
                        TransportStats::incr(&self.stats.send_failures);
                        tracing::warn!(%dest, error = %e, "send failed, skipping target");
                        report.failed_ports.push(port);
                        break;
                    }
                }
            }
        }

        tracing::debug!(
            bytes = payload.len(),
            datagrams = report.datagrams,
            targets = ports.len(),
            "payload sent"
        );
        Ok(report)
    }

    pub fn send_message(&self, message: &WireMessage) -> Result<SendReport, WireError> {
        self.send(&message.to_bytes()?)
    }

    /// Relay text typed by a local client, stamped with this node's id.
    pub fn send_client_text(&self, text: &str) -> Result<SendReport, WireError> {
        let event = classifier::outbound_event(text, &self.node_id, self.local_ip);
        self.send_message(&classifier::to_wire(&event, &self.node_id))
    }
}
