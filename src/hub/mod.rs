//! Broadcast hub
//!
//! One hub per topic. A single task owns the membership set and applies
//! every operation in the order it was submitted:
//!
//! ```text
//!   HubHandle ──┐
//!   HubHandle ──┼──► mpsc (unbounded) ──► Hub::run ──► Client::try_send ──► writer task
//!   HubHandle ──┘                            │
//!                                            └──► InboundHandler::on_inbound
//! ```
//!
//! Fan-out never waits on a client. A client whose queue is full is
//! unregistered on the spot and its queue closed, so one slow viewer cannot
//! hold back the rest.

pub mod client;
pub mod error;
pub mod message;

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use client::{Client, ClientId, ClientReceiver, DEFAULT_QUEUE_CAPACITY};
pub use error::CapacityError;
pub use message::Message;

/// Receives messages submitted through [`HubHandle::submit_inbound`]
///
/// Runs on the hub task, so it must not block.
pub trait InboundHandler: Send + 'static {
    fn on_inbound(&mut self, message: Message);
}

enum HubCommand {
    Register(Client),
    Unregister(ClientId),
    Broadcast(Bytes),
    Inbound(Message),
    Stats(oneshot::Sender<HubStats>),
}

/// Counters maintained by the hub task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub topic: String,
    pub clients: usize,
    pub registrations: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub dropped_slow: u64,
    pub inbound: u64,
}

/// Owner of one topic's membership set
pub struct Hub {
    topic: String,
    clients: HashMap<ClientId, Client>,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    handler: Option<Box<dyn InboundHandler>>,
    stats: HubStats,
}

impl Hub {
    /// Hub without an inbound handler; inbound messages are discarded
    pub fn new(topic: impl Into<String>) -> (Self, HubHandle) {
        Self::build(topic.into(), None)
    }

    pub fn with_handler<H: InboundHandler>(topic: impl Into<String>, handler: H) -> (Self, HubHandle) {
        Self::build(topic.into(), Some(Box::new(handler)))
    }

    fn build(topic: String, handler: Option<Box<dyn InboundHandler>>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            stats: HubStats {
                topic: topic.clone(),
                ..Default::default()
            },
            topic,
            clients: HashMap::new(),
            commands: rx,
            handler,
        };
        (hub, HubHandle { tx })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands until every [`HubHandle`] is dropped
    pub async fn run(mut self) {
        tracing::debug!(topic = %self.topic, "Hub started");

        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register(client) => self.register(client),
                HubCommand::Unregister(id) => self.unregister(id),
                HubCommand::Broadcast(data) => self.broadcast(data),
                HubCommand::Inbound(message) => self.inbound(message),
                HubCommand::Stats(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        tracing::debug!(
            topic = %self.topic,
            clients = self.clients.len(),
            "Hub stopped"
        );
    }

    fn register(&mut self, client: Client) {
        tracing::debug!(
            topic = %self.topic,
            client_id = %client.id(),
            peer = %client.remote_addr(),
            "Client registered"
        );
        self.stats.registrations += 1;
        self.clients.insert(client.id(), client);
    }

    fn unregister(&mut self, id: ClientId) {
        // Dropping the client closes its queue
        if self.clients.remove(&id).is_some() {
            tracing::debug!(topic = %self.topic, client_id = %id, "Client unregistered");
        }
    }

    fn broadcast(&mut self, data: Bytes) {
        self.stats.broadcasts += 1;

        let mut failed = Vec::new();
        for (id, client) in &self.clients {
            match client.try_send(data.clone()) {
                Ok(()) => self.stats.deliveries += 1,
                Err(e) => failed.push((*id, e)),
            }
        }

        for (id, error) in failed {
            if let Some(client) = self.clients.remove(&id) {
                match error {
                    CapacityError::Full => {
                        self.stats.dropped_slow += 1;
                        tracing::warn!(
                            topic = %self.topic,
                            client_id = %id,
                            peer = %client.remote_addr(),
                            "Dropping slow client"
                        );
                    }
                    CapacityError::Closed => {
                        tracing::debug!(topic = %self.topic, client_id = %id, "Client queue closed");
                    }
                }
            }
        }
    }

    fn inbound(&mut self, message: Message) {
        self.stats.inbound += 1;
        match self.handler.as_mut() {
            Some(handler) => handler.on_inbound(message),
            None => tracing::debug!(
                topic = %self.topic,
                len = message.data.len(),
                "Inbound message discarded, hub has no handler"
            ),
        }
    }

    fn snapshot(&self) -> HubStats {
        HubStats {
            clients: self.clients.len(),
            ..self.stats.clone()
        }
    }
}

/// Cloneable entry point to a running hub
///
/// Every method only enqueues; none of them wait for the hub task. After
/// the hub has stopped the calls do nothing.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubCommand::Register(client) => write!(f, "Register({})", client.id()),
            HubCommand::Unregister(id) => write!(f, "Unregister({id})"),
            HubCommand::Broadcast(data) => write!(f, "Broadcast({} bytes)", data.len()),
            HubCommand::Inbound(message) => write!(f, "Inbound({} bytes)", message.data.len()),
            HubCommand::Stats(_) => f.write_str("Stats"),
        }
    }
}

impl HubHandle {
    pub fn register(&self, client: Client) {
        self.send(HubCommand::Register(client));
    }

    pub fn unregister(&self, id: ClientId) {
        self.send(HubCommand::Unregister(id));
    }

    pub fn broadcast(&self, data: impl Into<Bytes>) {
        self.send(HubCommand::Broadcast(data.into()));
    }

    pub fn submit_inbound(&self, message: Message) {
        self.send(HubCommand::Inbound(message));
    }

    /// `None` once the hub has stopped
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Stats(reply)).ok()?;
        rx.await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: HubCommand) {
        if let Err(e) = self.tx.send(command) {
            tracing::debug!(command = ?e.0, "Hub stopped, command dropped");
        }
    }
}
