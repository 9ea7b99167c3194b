//! UDP socket construction with bounded retry.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use lanlink_core::config::BindConfig;

use super::TransportError;

/// Create a UDP socket bound to `addr`, able to send to broadcast addresses,
/// whose reads give up after `recv_timeout`.
pub fn make_socket(addr: SocketAddr, recv_timeout: Duration) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_read_timeout(Some(recv_timeout))?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Bind with exponential backoff. Gives up after `policy.max_attempts`
/// attempts and returns the last OS error.
pub async fn bind_with_backoff(
    addr: SocketAddr,
    policy: &BindConfig,
    recv_timeout: Duration,
) -> Result<UdpSocket, TransportError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match make_socket(addr, recv_timeout) {
            Ok(socket) => {
                if attempt > 1 {
                    tracing::info!(%addr, attempt, "bound after retry");
                }
                return Ok(socket);
            }
            Err(last) if attempt >= attempts => {
                return Err(TransportError::BindExhausted {
                    addr,
                    attempts,
                    last,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %addr,
                    attempt,
                    max_attempts = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "bind failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
