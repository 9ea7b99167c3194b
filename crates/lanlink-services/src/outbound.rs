//! Outbound requests from API handlers and live clients to the sender task.

use tokio::sync::mpsc;

use lanlink_core::WireMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundSignal {
    /// Raw text from a live client, interpreted by the sender.
    ClientText(String),
    /// An already-built wire message.
    Message(WireMessage),
}

pub type OutboundTx = mpsc::UnboundedSender<OutboundSignal>;
pub type OutboundRx = mpsc::UnboundedReceiver<OutboundSignal>;

pub fn channel() -> (OutboundTx, OutboundRx) {
    mpsc::unbounded_channel()
}
