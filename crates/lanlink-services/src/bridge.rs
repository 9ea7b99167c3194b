//! Event bridge — carries canonical events from the blocking transport
//! thread to the broadcaster task.
//!
//! The bridge owns nothing but the queue. [`EventPoster`] is cheap to clone
//! and safe to call from any thread without an async runtime; [`EventDrain`]
//! lives on the broadcaster task. Events come out in the order they went in.

use tokio::sync::mpsc;

use lanlink_core::CanonicalEvent;

/// Returned by [`EventPoster::post`] once the receiving side is gone.
/// Hands the event back so the caller can log or drop it.
#[derive(Debug, thiserror::Error)]
#[error("event bridge closed, {} event dropped", .0.kind())]
pub struct BridgeClosed(pub CanonicalEvent);

/// Create a connected poster/drain pair.
pub fn channel() -> (EventPoster, EventDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventPoster { tx }, EventDrain { rx })
}

/// Producer side. Never blocks.
#[derive(Clone, Debug)]
pub struct EventPoster {
    tx: mpsc::UnboundedSender<CanonicalEvent>,
}

impl EventPoster {
    /// Queue an event for the broadcaster.
    pub fn post(&self, event: CanonicalEvent) -> Result<(), BridgeClosed> {
        self.tx.send(event).map_err(|e| BridgeClosed(e.0))
    }

    /// True once the drain side has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side. Owned by the broadcaster task.
#[derive(Debug)]
pub struct EventDrain {
    rx: mpsc::UnboundedReceiver<CanonicalEvent>,
}

impl EventDrain {
    /// Take every event queued right now, oldest first. Never waits.
    pub fn drain(&mut self) -> Vec<CanonicalEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait until at least one event is queued, then take it and everything
    /// behind it. Returns `None` once every poster has been dropped and the
    /// queue is empty.
    pub async fn next_batch(&mut self) -> Option<Vec<CanonicalEvent>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        batch.extend(self.drain());
        Some(batch)
    }

    /// Stop accepting new events. Already-queued events can still be drained;
    /// subsequent posts fail with [`BridgeClosed`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}
