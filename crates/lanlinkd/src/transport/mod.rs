//! UDP transport — one socket, a blocking receive thread, and a sender that
//! shares the socket.

pub mod bind;
pub mod local;
pub mod receive;
pub mod send;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use lanlink_core::config::LanlinkConfig;
use lanlink_services::{EventPoster, Reassembler, TransportStats};

pub use local::SelfFilter;
pub use receive::ReceiveLoop;
pub use send::OutboundSender;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not bind {addr} after {attempts} attempts: {last}")]
    BindExhausted {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        last: std::io::Error,
    },
    #[error("socket setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A running transport. Dropping it without [`Transport::stop`] leaves the
/// receive thread running until the process exits.
pub struct Transport {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sender: OutboundSender,
    local_addr: SocketAddr,
}

impl Transport {
    /// Bind the socket (with backoff), work out our own address and start the
    /// receive thread.
    pub async fn start(
        config: &LanlinkConfig,
        poster: EventPoster,
        stats: Arc<TransportStats>,
    ) -> Result<Self, TransportError> {
        let addr = SocketAddr::new(config.network.bind_addr, config.network.udp_port);
        let socket =
            bind::bind_with_backoff(addr, &config.bind, config.transport.recv_timeout()).await?;
        let local_addr = socket.local_addr()?;

        let local_ip = local::probe_local_ip(config.network.broadcast_addr);
        let filter = SelfFilter::new(local_ip, local_addr.port());

        let sender = OutboundSender::new(socket.try_clone()?, config, local_ip, stats.clone());

        let running = Arc::new(AtomicBool::new(true));
        let receive = ReceiveLoop::new(
            socket,
            Reassembler::from_config(&config.transport),
            poster,
            filter,
            stats,
            running.clone(),
        );
        let thread = std::thread::Builder::new()
            .name("lanlink-recv".into())
            .spawn(move || receive.run())?;

        tracing::info!(
            addr = %local_addr,
            %local_ip,
            targets = ?config.network.broadcast_ports,
            "transport started"
        );

        Ok(Self {
            running,
            thread: Some(thread),
            sender,
            local_addr,
        })
    }

    pub fn sender(&self) -> OutboundSender {
        self.sender.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clear the running flag and wait for the receive thread. Returns
    /// within one receive timeout.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("receive thread panicked");
            }
        }
    }
}
