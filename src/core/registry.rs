//! The set of live connections and broadcast fan-out
//!
//! The registry itself is a plain map; the hub holds it behind a single
//! mutex so that registration, unregistration and broadcast enumeration are
//! mutually exclusive and the set is never observed in a torn state.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::core::connection::{Connection, Liveness};
use crate::core::WsMessage;

pub(crate) struct Registry {
    connections: HashMap<Uuid, Arc<Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Add a connection. No-op if it is already present.
    pub fn register(&mut self, conn: Arc<Connection>) {
        self.connections.entry(conn.id()).or_insert(conn);
    }

    /// Remove a connection. Idempotent: removing an absent id is a no-op
    /// and returns `None`.
    pub fn unregister(&mut self, id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(id)
    }

    /// Enqueue `frame` onto every live connection's outbound queue.
    ///
    /// Never blocks. Connections that have already closed, or whose queue is
    /// at capacity, are removed from the set and returned so the caller can
    /// finish tearing them down outside the registry lock; every other
    /// connection still receives the frame.
    pub fn fan_out(&mut self, frame: &WsMessage) -> Vec<Arc<Connection>> {
        let mut evicted = Vec::new();

        self.connections.retain(|_, conn| {
            if conn.liveness() != Liveness::Open {
                evicted.push(conn.clone());
                return false;
            }

            match conn.enqueue(frame.clone()) {
                Ok(()) => true,
                Err(_) => {
                    evicted.push(conn.clone());
                    false
                }
            }
        });

        evicted
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.connections.contains_key(id)
    }
}
