//! Event fan-out to connected observers.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vista_rpc::{Args, CallFrame, ClientEvent};

use super::connection::{Connection, ConnectionId};
use crate::metrics::{EVENTS_BROADCAST_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// Every open observer connection, keyed by id.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<Connection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id().clone(), connection);
    }

    /// Remove a connection by id.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(id)
    }

    /// Open connections at this instant.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Push `event` to every open connection.
    ///
    /// The frame is encoded once and shared. Each delivery is independent: a
    /// refused frame is logged and counted, and never affects the others.
    /// Returns the number of connections that accepted the frame.
    pub async fn broadcast(&self, event: ClientEvent, args: Args) -> usize {
        let targets = self.snapshot().await;
        if targets.is_empty() {
            return 0;
        }

        let frame = Arc::new(CallFrame::event(event, args).encode());
        let mut delivered = 0;
        for conn in &targets {
            match conn.deliver(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(conn_id = %conn.id(), event = %event, error = %err, "failed to deliver event");
                    counter!(WS_BROADCAST_DROPS_TOTAL, "event" => event.as_str()).increment(1);
                }
            }
        }
        counter!(EVENTS_BROADCAST_TOTAL, "event" => event.as_str()).increment(1);
        debug!(
            event = %event,
            recipients = targets.len(),
            delivered,
            bytes = frame.len(),
            "broadcast event"
        );
        delivered
    }

    /// Close and forget every connection.
    pub async fn close_all(&self) {
        let conns: Vec<_> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for conn in conns {
            let _ = conn.close();
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
