//! Send worker — dequeues outbound signals from the API and live clients
//! and hands them to the transport.

use tokio::sync::broadcast;

use lanlink_services::{OutboundRx, OutboundSignal};

use crate::transport::OutboundSender;

pub struct SendWorker {
    sender: OutboundSender,
    outbound_rx: OutboundRx,
    shutdown: broadcast::Receiver<()>,
}

impl SendWorker {
    pub fn new(
        sender: OutboundSender,
        outbound_rx: OutboundRx,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            sender,
            outbound_rx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("send worker shutting down");
                    return Ok(());
                }

                msg = self.outbound_rx.recv() => {
                    let Some(signal) = msg else {
                        tracing::info!("outbound channel closed, send worker exiting");
                        return Ok(());
                    };
                    self.send(signal);
                }
            }
        }
    }

    fn send(&self, signal: OutboundSignal) {
        let result = match &signal {
            OutboundSignal::ClientText(text) => self.sender.send_client_text(text),
            OutboundSignal::Message(message) => self.sender.send_message(message),
        };
        match result {
            Ok(report) if report.failed_ports.is_empty() => {
                tracing::debug!(datagrams = report.datagrams, "outbound signal sent");
            }
            Ok(report) => {
                tracing::warn!(
                    datagrams = report.datagrams,
                    failed_ports = ?report.failed_ports,
                    "outbound signal partially sent"
                );
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode outbound signal"),
        }
    }
}
