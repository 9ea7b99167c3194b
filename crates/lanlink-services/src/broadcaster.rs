//! Broadcaster — fans canonical events out to every live client connection.
//!
//! The connection registry is owned by a single task ([`BroadcasterTask`]).
//! Nothing else touches it: API handlers talk to the task through a
//! [`BroadcasterHandle`], the transport thread talks to it through the
//! event bridge.
//!
//! Each event is serialized once and the same `Arc<str>` frame is handed to
//! every connection. Delivery never waits on a client: a connection whose
//! sink fails is collected during the pass and dropped after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use lanlink_core::{CanonicalEvent, SystemNotice};

use crate::bridge::EventDrain;

/// Opaque per-connection identifier, unique for the life of the process.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("client queue full")]
    Full,
    #[error("client disconnected")]
    Closed,
}

/// Where frames for one client go.
pub trait ClientSink: Send {
    /// Hand over one serialized frame. Must not block.
    fn deliver(&mut self, frame: Arc<str>) -> Result<(), DeliveryError>;
}

/// A bounded in-memory queue drained by the connection's own writer task.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl QueueSink {
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }
}

impl ClientSink for QueueSink {
    fn deliver(&mut self, frame: Arc<str>) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Connections dropped because their sink failed during this pass.
    pub removed: Vec<ConnectionId>,
}

/// The connection registry and fan-out logic, without any task plumbing.
#[derive(Default)]
pub struct Broadcaster {
    connections: HashMap<ConnectionId, Box<dyn ClientSink>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Registering an id that is already present is a
    /// no-op and the existing sink is kept. Returns whether it was added.
    pub fn register(&mut self, id: ConnectionId, sink: Box<dyn ClientSink>) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(id, sink);
        tracing::debug!(connection = id, clients = self.connections.len(), "client registered");
        true
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            tracing::debug!(connection = id, clients = self.connections.len(), "client unregistered");
        }
        removed
    }

    /// Deliver `event` to every registered connection.
    pub fn broadcast(&mut self, event: &CanonicalEvent) -> FanoutReport {
        match encode_frame(event) {
            Some(frame) => self.fan_out(frame),
            None => FanoutReport::default(),
        }
    }

    /// Deliver a locally generated notice to every registered connection.
    pub fn broadcast_notice(&mut self, notice: &SystemNotice) -> FanoutReport {
        match encode_frame(notice) {
            Some(frame) => self.fan_out(frame),
            None => FanoutReport::default(),
        }
    }

    /// Deliver a notice to one connection. A failing sink is dropped.
    pub fn send_to(&mut self, id: ConnectionId, notice: &SystemNotice) -> bool {
        let Some(frame) = encode_frame(notice) else {
            return false;
        };
        let Some(sink) = self.connections.get_mut(&id) else {
            return false;
        };
        match sink.deliver(frame) {
            Ok(()) => true,
            Err(e) => {
                self.connections.remove(&id);
                tracing::warn!(connection = id, error = %e, "dropping client after failed send");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    fn fan_out(&mut self, frame: Arc<str>) -> FanoutReport {
        let mut report = FanoutReport::default();

        // The registry is not mutated while iterating; failures are removed
        // after the pass and the failed connection is not told about it.
        for (id, sink) in self.connections.iter_mut() {
            match sink.deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(connection = *id, error = %e, "client delivery failed");
                    report.removed.push(*id);
                }
            }
        }

        for id in &report.removed {
            self.connections.remove(id);
        }
        if !report.removed.is_empty() {
            tracing::info!(
                removed = report.removed.len(),
                clients = self.connections.len(),
                "dropped failed clients"
            );
        }
        report
    }
}

fn encode_frame<T: Serialize>(value: &T) -> Option<Arc<str>> {
    match serde_json::to_string(value) {
        Ok(s) => Some(Arc::from(s)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize client frame");
            None
        }
    }
}

// ── Task ─────────────────────────────────────────────────────────────────────

enum Command {
    Connect {
        id: ConnectionId,
        sink: Box<dyn ClientSink>,
        greeting: Option<SystemNotice>,
    },
    Disconnect(ConnectionId),
    Notice(SystemNotice),
    Count(oneshot::Sender<usize>),
}

/// Cloneable front door to the broadcaster task.
#[derive(Clone)]
pub struct BroadcasterHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl BroadcasterHandle {
    /// Register a new client backed by a queue of `queue_depth` frames.
    /// `greeting`, if given, is the first frame the client sees.
    pub fn connect(
        &self,
        queue_depth: usize,
        greeting: Option<SystemNotice>,
    ) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let (sink, rx) = QueueSink::channel(queue_depth);
        let id = self.attach(Box::new(sink), greeting);
        (id, rx)
    }

    /// Register an arbitrary sink. If the task is gone the sink is dropped.
    pub fn attach(&self, sink: Box<dyn ClientSink>, greeting: Option<SystemNotice>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Command::Connect { id, sink, greeting });
        id
    }

    pub fn disconnect(&self, id: ConnectionId) {
        let _ = self.tx.send(Command::Disconnect(id));
    }

    /// Fan a system notice out to every client.
    pub fn notice(&self, message: impl Into<String>) {
        let _ = self.tx.send(Command::Notice(SystemNotice::now(message)));
    }

    /// Number of registered clients, or 0 once the task has stopped.
    pub async fn client_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Owns the [`Broadcaster`] and the drain side of the event bridge.
pub struct BroadcasterTask {
    broadcaster: Broadcaster,
    events: EventDrain,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: broadcast::Receiver<()>,
}

impl BroadcasterTask {
    pub fn new(events: EventDrain, shutdown: broadcast::Receiver<()>) -> (Self, BroadcasterHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let handle = BroadcasterHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let task = Self {
            broadcaster: Broadcaster::new(),
            events,
            commands,
            shutdown,
        };
        (task, handle)
    }

    pub async fn run(mut self) {
        tracing::info!("broadcaster started");
        loop {
            tokio::select! {
                biased;
                Some(cmd) = self.commands.recv() => self.apply(cmd),
                Some(batch) = self.events.next_batch() => {
                    for event in &batch {
                        self.broadcaster.broadcast(event);
                    }
                }
                _ = self.shutdown.recv() => break,
            }
        }

        // Stop intake, then deliver whatever was already queued exactly once.
        self.events.close();
        let remaining = self.events.drain();
        for event in &remaining {
            self.broadcaster.broadcast(event);
        }
        tracing::info!(
            flushed = remaining.len(),
            clients = self.broadcaster.len(),
            "broadcaster stopped"
        );
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { id, sink, greeting } => {
                if self.broadcaster.register(id, sink) {
                    if let Some(notice) = greeting {
                        self.broadcaster.send_to(id, &notice);
                    }
                }
            }
            Command::Disconnect(id) => {
                self.broadcaster.unregister(id);
            }
            Command::Notice(notice) => {
                self.broadcaster.broadcast_notice(&notice);
            }
            Command::Count(reply) => {
                let _ = reply.send(self.broadcaster.len());
            }
        }
    }
}
