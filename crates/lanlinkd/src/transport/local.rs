//! Local address discovery and self-filtering.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Find the address of the interface that would carry traffic to `target`.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick a
/// route and source address. Falls back to loopback when there is no route.
pub fn probe_local_ip(target: IpAddr) -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let bind: SocketAddr = match target {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_broadcast(true)?;
        socket.connect((target, 9))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!(%target, error = %e, "local address probe failed, assuming loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Decides whether a datagram came from this node.
///
/// A datagram is ours when it was sent from our own receive port by one of
/// our addresses: the probed interface address, loopback, or unspecified.
/// Matching on the port as well lets several nodes share one host.
#[derive(Debug, Clone, Copy)]
pub struct SelfFilter {
    local_ip: IpAddr,
    port: u16,
}

impl SelfFilter {
    pub fn new(local_ip: IpAddr, port: u16) -> Self {
        Self { local_ip, port }
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_self(&self, from: SocketAddr) -> bool {
        if from.port() != self.port {
            return false;
        }
        let ip = from.ip();
        ip == self.local_ip || ip.is_loopback() || ip.is_unspecified()
    }
}
