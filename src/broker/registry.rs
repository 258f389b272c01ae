use std::sync::Arc;

use dashmap::DashMap;

use crate::client::Connection;

pub type UserId = String;

/// Process-local map from authenticated user to live connection.
///
/// Backed by a sharded `DashMap`, so updates are linearizable per user
/// without a process-wide lock. Nothing here is visible to other
/// processes; cross-process reachability goes through the fanout bus.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `conn`, returning the superseded connection if any.
    /// The old connection is not closed.
    pub fn register(&self, user_id: &str, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections.insert(user_id.to_string(), conn)
    }

    pub fn lookup(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the mapping only if it still points at `connection_id`, so a
    /// late close of a superseded socket cannot evict its replacement.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        self.connections
            .remove_if(user_id, |_, conn| conn.id == connection_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
