//! Live connections keyed by identity.
//!
//! The registry only resolves where an event should go. Actual sends are
//! collected in an [`Outbox`] and flushed by the coordinator once the state
//! lock has been released.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use pairchat_common::ServerEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Identity;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Distinguishes successive connections made with the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Handle to one participant's socket writer.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    label: String,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    pub fn new(label: impl Into<String>, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Display name shown to peers.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: HashMap<Identity, Connection>,
}

impl SessionRegistry {
    /// Registers `connection`, returning any connection it replaced.
    pub fn register(&mut self, identity: Identity, connection: Connection) -> Option<Connection> {
        self.connections.insert(identity, connection)
    }

    /// Removes the identity if `id` is still its current connection.
    pub fn unregister(&mut self, identity: &Identity, id: ConnectionId) -> Option<Connection> {
        if self.is_current(identity, id) {
            self.connections.remove(identity)
        } else {
            None
        }
    }

    pub fn lookup(&self, identity: &Identity) -> Option<&Connection> {
        self.connections.get(identity)
    }

    pub fn is_current(&self, identity: &Identity, id: ConnectionId) -> bool {
        self.lookup(identity).is_some_and(|conn| conn.id == id)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.connections.keys()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queues `event` for `identity`. The handle is resolved now, so an
    /// identity that is gone at this point gets nothing.
    pub fn deliver(&self, outbox: &mut Outbox, identity: &Identity, event: ServerEvent) {
        outbox.deliveries.push(Delivery {
            identity: identity.clone(),
            connection: self.lookup(identity).cloned(),
            event,
        });
    }
}

#[derive(Debug)]
struct Delivery {
    identity: Identity,
    connection: Option<Connection>,
    event: ServerEvent,
}

/// Events produced by one committed transition, in the order they were decided.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Best-effort: a missing or closed connection is logged and skipped.
    pub fn flush(self) {
        for Delivery {
            identity,
            connection,
            event,
        } in self.deliveries
        {
            match connection {
                Some(conn) if conn.send(event) => {}
                Some(_) => {
                    warn!(identity = %identity, "connection closed, dropping event");
                }
                None => {
                    debug!(identity = %identity, "identity not connected, dropping event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(label: &str) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(label, tx), rx)
    }

    #[test]
    fn deliver_reaches_registered_identity() {
        let mut registry = SessionRegistry::default();
        let (conn, mut rx) = connection("A");
        registry.register(Identity::from("a"), conn);

        let mut outbox = Outbox::default();
        registry.deliver(&mut outbox, &Identity::from("a"), ServerEvent::Waiting);
        outbox.flush();

        assert_eq!(rx.try_recv().ok(), Some(ServerEvent::Waiting));
    }

    #[test]
    fn deliver_to_absent_or_closed_identity_is_dropped() {
        let mut registry = SessionRegistry::default();
        let (conn, rx) = connection("A");
        registry.register(Identity::from("a"), conn);
        drop(rx);

        let mut outbox = Outbox::default();
        registry.deliver(&mut outbox, &Identity::from("a"), ServerEvent::Waiting);
        registry.deliver(&mut outbox, &Identity::from("ghost"), ServerEvent::Waiting);
        assert_eq!(outbox.len(), 2);
        outbox.flush();
    }

    #[test]
    fn per_identity_order_matches_call_order() {
        let mut registry = SessionRegistry::default();
        let (conn, mut rx) = connection("A");
        registry.register(Identity::from("a"), conn);

        let mut outbox = Outbox::default();
        for text in ["one", "two", "three"] {
            registry.deliver(&mut outbox, &Identity::from("a"), ServerEvent::message(text, "B"));
        }
        outbox.flush();

        for text in ["one", "two", "three"] {
            assert_eq!(rx.try_recv().ok(), Some(ServerEvent::message(text, "B")));
        }
    }

    #[test]
    fn stale_connection_cannot_unregister_replacement() {
        let mut registry = SessionRegistry::default();
        let (first, _rx1) = connection("A");
        let (second, _rx2) = connection("A");
        let first_id = first.id();
        let second_id = second.id();

        registry.register(Identity::from("a"), first);
        let replaced = registry.register(Identity::from("a"), second);
        assert_eq!(replaced.map(|c| c.id()), Some(first_id));

        assert!(registry.unregister(&Identity::from("a"), first_id).is_none());
        assert!(registry.is_current(&Identity::from("a"), second_id));
        assert!(registry.unregister(&Identity::from("a"), second_id).is_some());
        assert!(registry.is_empty());
    }
}
